use super::{direct_method_name, hooks, CodeBuilderExts, TransformCause};
use crate::config::Configuration;
use crate::jvm::class_file::Version;
use crate::jvm::code::{
    BranchInstruction, CodeElement, EqComparison, FieldRef, Insn, Instruction, InvokeType,
    MethodBody, MethodRef, SynLabel, TryCatch,
};
use crate::jvm::hierarchy::{superclass_chain, ClassLookup};
use crate::jvm::model::{ClassNode, FieldNode, MethodNode};
use crate::jvm::{
    BinaryName, ClassAccessFlags, FieldAccessFlags, FieldType, MethodAccessFlags,
    MethodDescriptor, Name, RefType, RenderDescriptor, UnqualifiedName,
};
use log::{debug, trace};
use std::collections::HashSet;

/// Rewrites the methods of a class so that they dispatch through the runtime
pub struct ClassInstrumentor<'a> {
    config: &'a Configuration,

    /// Used to check whether super classes make `Object` methods final
    lookup: &'a dyn ClassLookup,
}

/// Names shared by everything generated for one class
struct Target {
    this_class: BinaryName,
    super_class: BinaryName,
}

impl<'a> ClassInstrumentor<'a> {
    pub fn new(config: &'a Configuration, lookup: &'a dyn ClassLookup) -> ClassInstrumentor<'a> {
        ClassInstrumentor { config, lookup }
    }

    /// Instrument a class
    ///
    /// Classes which already implement the marker interface are returned unchanged.
    pub fn instrument(&self, mut class: ClassNode) -> Result<ClassNode, TransformCause> {
        if class.interfaces.contains(&BinaryName::SHADOWED_OBJECT) {
            debug!("{} is already instrumented", class.name);
            return Ok(class);
        }
        class.interfaces.push(BinaryName::SHADOWED_OBJECT);
        if class.is_interface() {
            return Ok(class);
        }

        let target = Target {
            this_class: class.name.clone(),
            super_class: class
                .super_class
                .clone()
                .unwrap_or(BinaryName::OBJECT),
        };

        let was_final = class.access_flags.contains(ClassAccessFlags::FINAL);
        class.access_flags = class.access_flags.made_public() - ClassAccessFlags::FINAL;
        if was_final {
            let message = format!(
                "{} is final, so it can't be mocked: use the real class or a shadow",
                target.this_class.to_dotted()
            );
            class.add_annotation(&BinaryName::DO_NOT_MOCK, &[("value", &message)])?;
        }

        // `ldc` of a class constant and stack map frames both need a recent enough version
        if class.version < Version::JAVA6 {
            class.version = Version::JAVA6;
        }

        for field in &mut class.fields {
            field.access_flags.remove(FieldAccessFlags::FINAL);
        }
        class.fields.push(FieldNode::new(
            FieldAccessFlags::PUBLIC | FieldAccessFlags::SYNTHETIC,
            UnqualifiedName::SHADOW_DATA,
            FieldType::object(BinaryName::OBJECT),
        ));

        for method in &mut class.methods {
            if let Some(body) = &mut method.body {
                self.intercept_calls(&target.this_class, body);
            }
        }

        self.add_object_method_overrides(&mut class, &target);

        let methods = std::mem::take(&mut class.methods);
        let mut instrumented = Vec::with_capacity(methods.len() * 2 + 4);
        let mut has_default_constructor = false;
        for mut method in methods {
            if method.name == UnqualifiedName::CLINIT {
                method.name = UnqualifiedName::STATIC_INITIALIZER;
                instrumented.push(method);
                instrumented.push(static_initializer_notifier(&target));
            } else if method.is_constructor() {
                has_default_constructor |= method.descriptor.parameters.is_empty();
                self.instrument_constructor(&target, method, &mut instrumented)?;
            } else if method
                .access_flags
                .intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::SYNTHETIC)
            {
                instrumented.push(method);
            } else {
                self.instrument_normal_method(&target, method, &mut instrumented)?;
            }
        }

        if !has_default_constructor {
            instrumented.push(default_constructor(&target));
        }
        instrumented.push(shadow_init_method(&target));
        instrumented.push(get_shadow_data_method(&target));
        class.methods = instrumented;

        Ok(class)
    }

    /// Split the method into a private direct method holding the original code and a delegator
    /// (with the original name) which dispatches through the runtime
    fn instrument_normal_method(
        &self,
        target: &Target,
        mut method: MethodNode,
        instrumented: &mut Vec<MethodNode>,
    ) -> Result<(), TransformCause> {
        trace!("Instrumenting {}.{}", target.this_class, method.signature());
        let original_name = method.name.clone();
        let is_static = method.is_static();

        let delegator_flags = method.access_flags
            - (MethodAccessFlags::NATIVE | MethodAccessFlags::ABSTRACT | MethodAccessFlags::FINAL);
        let mut delegator =
            MethodNode::new(delegator_flags, original_name.clone(), method.descriptor.clone());
        delegator.attributes = method.attributes.clone();

        // There is no real implementation, so the best fallback is to do nothing
        if method.access_flags.contains(MethodAccessFlags::NATIVE) {
            method.access_flags.remove(MethodAccessFlags::NATIVE);
            let mut body = MethodBody::new();
            body.return_default(method.descriptor.return_type.as_ref());
            method.body = Some(body);
        }
        method.name = direct_method_name(&target.this_class, &original_name);
        method.access_flags = method.access_flags.made_private() | MethodAccessFlags::FINAL;

        let mut body = MethodBody::new();
        dispatch_stub(
            &mut body,
            target,
            &original_name,
            &method.descriptor,
            is_static,
            &method.name,
        );
        delegator.body = Some(body);

        instrumented.push(method);
        instrumented.push(delegator);
        Ok(())
    }

    /// Split a constructor into a wrapper constructor and a private direct method
    ///
    /// The wrapper keeps the call to the super (or sibling) constructor, then initializes the
    /// shadow and dispatches the rest through the runtime as `__constructor__`.
    fn instrument_constructor(
        &self,
        target: &Target,
        mut method: MethodNode,
        instrumented: &mut Vec<MethodNode>,
    ) -> Result<(), TransformCause> {
        let body = match method.body.take() {
            Some(body) => body,
            None => {
                instrumented.push(method);
                return Ok(());
            }
        };
        let (mut wrapper_body, direct_body) = split_super_constructor_call(target, body)
            .ok_or_else(|| {
                TransformCause::MissingSuperConstructorCall(format!(
                    "{}.{}",
                    target.this_class.to_dotted(),
                    method.signature()
                ))
            })?;
        let direct_name = direct_method_name(&target.this_class, &UnqualifiedName::CONSTRUCTOR);

        let mut wrapper = MethodNode::new(
            method.access_flags.made_public(),
            UnqualifiedName::INIT,
            method.descriptor.clone(),
        );
        wrapper.attributes = method.attributes.clone();
        wrapper_body.push(Instruction::ALoad(0));
        wrapper_body.push(Insn::invoke_virtual(
            target.this_class.clone(),
            UnqualifiedName::SHADOW_INIT,
            hooks::void(),
        ));
        dispatch_stub(
            &mut wrapper_body,
            target,
            &UnqualifiedName::CONSTRUCTOR,
            &method.descriptor,
            false,
            &direct_name,
        );
        wrapper.body = Some(wrapper_body);

        let mut redirector = MethodNode::new(
            MethodAccessFlags::PRIVATE,
            UnqualifiedName::CONSTRUCTOR,
            method.descriptor.clone(),
        );
        let mut redirector_body = MethodBody::new();
        redirector_body.push(Instruction::ALoad(0));
        redirector_body.get_parameters(1, &method.descriptor.parameters);
        redirector_body.push(Insn::invoke_special(
            target.this_class.clone(),
            direct_name.clone(),
            method.descriptor.clone(),
        ));
        redirector_body.return_(None);
        redirector.body = Some(redirector_body);

        method.name = direct_name;
        method.access_flags = method.access_flags.made_private();
        method.body = Some(direct_body);

        instrumented.push(wrapper);
        instrumented.push(method);
        instrumented.push(redirector);
        Ok(())
    }

    /// Add overrides of `equals`, `hashCode`, and `toString` which just call the super class
    ///
    /// Once instrumented, these let shadows substitute the methods even when the real class
    /// inherits them.
    fn add_object_method_overrides(&self, class: &mut ClassNode, target: &Target) {
        for (name, descriptor) in hooks::object_methods() {
            if class.find_method(&name, &descriptor).is_some()
                || self.is_final_in_super_classes(&target.super_class, &name, &descriptor)
            {
                continue;
            }

            let mut body = MethodBody::new();
            body.push(Instruction::ALoad(0));
            body.get_parameters(1, &descriptor.parameters);
            body.push(Insn::invoke_special(
                target.super_class.clone(),
                name.clone(),
                descriptor.clone(),
            ));
            body.return_(descriptor.return_type.as_ref());

            let mut method = MethodNode::new(MethodAccessFlags::PUBLIC, name, descriptor);
            method.body = Some(body);
            class.methods.push(method);
        }
    }

    fn is_final_in_super_classes(
        &self,
        super_class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> bool {
        let descriptor = descriptor.render();
        superclass_chain(self.lookup, super_class)
            .iter()
            .filter_map(|class| self.lookup.lookup(class))
            .any(|summary| {
                summary
                    .find_method(name, &descriptor)
                    .map_or(false, |method| {
                        method.access_flags.contains(MethodAccessFlags::FINAL)
                    })
            })
    }

    /// Replace calls to intercepted methods with calls to the runtime's interceptor hook
    fn intercept_calls(&self, this_class: &BinaryName, body: &mut MethodBody) {
        let intercepted = |method: &MethodRef| match &method.class {
            RefType::Object(owner) => self.config.should_intercept(owner, &method.name),
            _ => false,
        };
        let needs_rewrite = body.instructions().any(|insn| match insn {
            Instruction::Invoke(_, method) => intercepted(method),
            _ => false,
        });
        if !needs_rewrite {
            return;
        }

        let elements = std::mem::take(&mut body.elements);
        for element in elements {
            match element {
                CodeElement::Instruction(Instruction::Invoke(invoke_type, method))
                    if intercepted(&method) =>
                {
                    intercepted_call(body, this_class, invoke_type, &method);
                }
                other => body.elements.push(other),
            }
        }
    }
}

/// Call the interceptor hook with the arguments already on the stack
///
/// ```text,ignore,no_run
/// [receiver,] arg1 .. argN
///   => [receiver | null], Object[]                      (args boxed into an array)
///   => "owner/name(desc)", [receiver | null], Object[]  (signature slid under the rest)
///   => ShadowRuntime.intercept(signature, receiver, args, CallingClass.class)
///   => result converted back to the return type of the intercepted method
/// ```
fn intercepted_call(
    body: &mut MethodBody,
    this_class: &BinaryName,
    invoke_type: InvokeType,
    method: &MethodRef,
) {
    trace!(
        "Intercepting call to {}.{} in {}",
        method.class.class_constant_name(),
        method.name,
        this_class
    );
    body.stack_arguments_array(&method.descriptor.parameters);
    if invoke_type == InvokeType::Static {
        body.push(Instruction::AConstNull);
        body.push(Instruction::Swap);
    }
    body.const_string(format!(
        "{}/{}{}",
        method.class.class_constant_name(),
        method.name.as_str(),
        method.descriptor.render()
    ));
    body.push(Instruction::DupX2);
    body.push(Instruction::Pop);
    body.const_class(this_class);
    body.push(Insn::invoke_static(
        BinaryName::SHADOW_RUNTIME,
        UnqualifiedName::INTERCEPT,
        hooks::intercept(),
    ));
    body.unbox_or_default(method.descriptor.return_type.as_ref());
}

/// Generate the code which asks the runtime what to run, then runs it
///
/// ```text,ignore,no_run
///     plan = ShadowRuntime.methodInvoked("Owner/name(desc)", isStatic, Owner.class)
///     if (plan != null) {
///         try {
///             return (T) plan.run(this, this.$$shadow$getData(), new Object[] { args... })
///         } catch (Throwable t) {
///             throw ShadowRuntime.cleanStackTrace(t)
///         }
///     }
///     try {
///         return this.$$shadow$$Owner$name(args...)
///     } catch (Throwable t) {
///         throw ShadowRuntime.cleanStackTrace(t)
///     }
/// ```
fn dispatch_stub(
    body: &mut MethodBody,
    target: &Target,
    method_name: &UnqualifiedName,
    descriptor: &MethodDescriptor<BinaryName>,
    is_static: bool,
    direct_name: &UnqualifiedName,
) {
    let first_parameter: u16 = if is_static { 0 } else { 1 };
    let plan_local = descriptor.parameter_length(!is_static) as u16;
    let return_type = descriptor.return_type.as_ref();
    let call_site = format!(
        "{}/{}{}",
        target.this_class.as_str(),
        method_name.as_str(),
        descriptor.render()
    );

    let call_direct = body.fresh_label();
    let plan_start = body.fresh_label();
    let plan_end = body.fresh_label();
    let handler = body.fresh_label();
    let direct_start = body.fresh_label();
    let direct_end = body.fresh_label();

    body.const_string(call_site);
    body.const_bool(is_static);
    body.const_class(&target.this_class);
    body.push(Insn::invoke_static(
        BinaryName::SHADOW_RUNTIME,
        UnqualifiedName::METHOD_INVOKED,
        hooks::method_invoked(),
    ));
    body.push(Instruction::AStore(plan_local));
    body.push(Instruction::ALoad(plan_local));
    body.push_branch(BranchInstruction::IfNull(EqComparison::EQ, call_direct));

    // Run the plan
    body.place_label(plan_start);
    body.push(Instruction::ALoad(plan_local));
    if is_static {
        body.push(Instruction::AConstNull);
        body.push(Instruction::AConstNull);
    } else {
        body.push(Instruction::ALoad(0));
        body.push(Instruction::ALoad(0));
        body.push(Insn::invoke_virtual(
            target.this_class.clone(),
            UnqualifiedName::GET_SHADOW_DATA,
            hooks::get_shadow_data(),
        ));
    }
    body.parameters_array(first_parameter, &descriptor.parameters);
    body.push(Insn::invoke_interface(
        BinaryName::PLAN,
        UnqualifiedName::RUN,
        hooks::plan_run(),
    ));
    body.unbox_or_default(return_type);
    body.return_(return_type);
    body.place_label(plan_end);

    // Shared failure handler
    body.place_label(handler);
    body.push(Insn::invoke_static(
        BinaryName::SHADOW_RUNTIME,
        UnqualifiedName::CLEAN_STACK_TRACE,
        hooks::clean_stack_trace(),
    ));
    body.push_branch(BranchInstruction::AThrow);

    // Run the original code
    body.place_label(call_direct);
    body.place_label(direct_start);
    if is_static {
        body.get_parameters(first_parameter, &descriptor.parameters);
        body.push(Insn::invoke_static(
            target.this_class.clone(),
            direct_name.clone(),
            descriptor.clone(),
        ));
    } else {
        body.push(Instruction::ALoad(0));
        body.get_parameters(first_parameter, &descriptor.parameters);
        body.push(Insn::invoke_special(
            target.this_class.clone(),
            direct_name.clone(),
            descriptor.clone(),
        ));
    }
    body.return_(return_type);
    body.place_label(direct_end);

    for (start, end) in [(plan_start, plan_end), (direct_start, direct_end)] {
        body.try_catches.push(TryCatch {
            start,
            end,
            handler,
            catch_type: Some(BinaryName::THROWABLE),
        });
    }
}

/// Separate the call to the super (or sibling) constructor from the rest of a constructor
///
/// The call starts at the last `aload_0` before the first `invokespecial <init>` on the class
/// or its super class. Returns the code of the call, then the rest of the body.
fn split_super_constructor_call(
    target: &Target,
    body: MethodBody,
) -> Option<(MethodBody, MethodBody)> {
    let mut start = 0;
    let mut call = None;
    for (idx, element) in body.elements.iter().enumerate() {
        match element {
            CodeElement::Instruction(Instruction::ALoad(0)) => start = idx,
            CodeElement::Instruction(Instruction::Invoke(InvokeType::Special, method))
                if method.name == UnqualifiedName::INIT
                    && matches!(
                        &method.class,
                        RefType::Object(owner)
                            if *owner == target.this_class || *owner == target.super_class
                    ) =>
            {
                call = Some(idx);
                break;
            }
            _ => (),
        }
    }
    let call = call?;

    let MethodBody {
        max_locals,
        mut elements,
        try_catches,
        local_variables,
        labels,
    } = body;
    let call_elements: Vec<CodeElement> = elements.drain(start..=call).collect();

    let remaining_labels: HashSet<SynLabel> = elements
        .iter()
        .filter_map(|element| match element {
            CodeElement::Label(label) => Some(*label),
            _ => None,
        })
        .collect();
    let try_catches = try_catches
        .into_iter()
        .filter(|try_catch| {
            [try_catch.start, try_catch.end, try_catch.handler]
                .iter()
                .all(|label| remaining_labels.contains(label))
        })
        .collect();
    let local_variables = local_variables
        .into_iter()
        .filter(|local| {
            remaining_labels.contains(&local.start) && remaining_labels.contains(&local.end)
        })
        .collect();

    let call_body = MethodBody {
        max_locals: 0,
        elements: call_elements,
        try_catches: vec![],
        local_variables: vec![],
        labels: labels.clone(),
    };
    let rest_body = MethodBody {
        max_locals,
        elements,
        try_catches,
        local_variables,
        labels,
    };
    Some((call_body, rest_body))
}

/// New `<clinit>` which lets the runtime decide how to initialize the class
fn static_initializer_notifier(target: &Target) -> MethodNode {
    let mut body = MethodBody::new();
    body.const_class(&target.this_class);
    body.push(Insn::invoke_static(
        BinaryName::SHADOW_RUNTIME,
        UnqualifiedName::CLASS_INITIALIZING,
        hooks::class_initializing(),
    ));
    body.return_(None);

    let mut method = MethodNode::new(
        MethodAccessFlags::STATIC,
        UnqualifiedName::CLINIT,
        hooks::void(),
    );
    method.body = Some(body);
    method
}

/// `public <init>() { super(); $$shadow$init(); }`
fn default_constructor(target: &Target) -> MethodNode {
    let mut body = MethodBody::new();
    body.push(Instruction::ALoad(0));
    body.push(Insn::invoke_special(
        target.super_class.clone(),
        UnqualifiedName::INIT,
        hooks::void(),
    ));
    body.push(Instruction::ALoad(0));
    body.push(Insn::invoke_virtual(
        target.this_class.clone(),
        UnqualifiedName::SHADOW_INIT,
        hooks::void(),
    ));
    body.return_(None);

    let mut method =
        MethodNode::new(MethodAccessFlags::PUBLIC, UnqualifiedName::INIT, hooks::void());
    method.body = Some(body);
    method
}

fn shadow_data_field(target: &Target) -> FieldRef {
    FieldRef {
        class: target.this_class.clone(),
        name: UnqualifiedName::SHADOW_DATA,
        descriptor: FieldType::object(BinaryName::OBJECT),
    }
}

/// `protected void $$shadow$init()`, which creates the shadow the first time it is called
fn shadow_init_method(target: &Target) -> MethodNode {
    let mut body = MethodBody::new();
    let done = body.fresh_label();
    body.push(Instruction::ALoad(0));
    body.push(Instruction::GetField(shadow_data_field(target)));
    body.push_branch(BranchInstruction::IfNull(EqComparison::NE, done));
    body.push(Instruction::ALoad(0));
    body.push(Instruction::ALoad(0));
    body.push(Insn::invoke_static(
        BinaryName::SHADOW_RUNTIME,
        UnqualifiedName::INITIALIZING,
        hooks::initializing(),
    ));
    body.push(Instruction::PutField(shadow_data_field(target)));
    body.place_label(done);
    body.return_(None);

    let mut method = MethodNode::new(
        MethodAccessFlags::PROTECTED,
        UnqualifiedName::SHADOW_INIT,
        hooks::void(),
    );
    method.body = Some(body);
    method
}

/// `public Object $$shadow$getData()`, as declared on the marker interface
fn get_shadow_data_method(target: &Target) -> MethodNode {
    let mut body = MethodBody::new();
    body.push(Instruction::ALoad(0));
    body.push(Instruction::GetField(shadow_data_field(target)));
    body.return_(Some(&FieldType::object(BinaryName::OBJECT)));

    let mut method = MethodNode::new(
        MethodAccessFlags::PUBLIC,
        UnqualifiedName::GET_SHADOW_DATA,
        hooks::get_shadow_data(),
    );
    method.body = Some(body);
    method
}
