//! Rewriting classes so that their behaviour can be substituted at runtime
//!
//! ### Shape of an instrumented class
//!
//! Every non-abstract method `name` of class `Owner` is split in two:
//!
//!   - a private _direct_ method `$$shadow$$<mangled Owner>$name` holding the original code
//!     (native methods get a body returning the zero value)
//!   - a _delegator_ with the original name and access, whose body asks the runtime for a plan
//!     with `ShadowRuntime.methodInvoked` and either runs it or calls the direct method
//!
//! Constructors keep their call to the super constructor, then create the shadow (through
//! `$$shadow$init`) and dispatch the rest of the original body as `__constructor__`. The static
//! initializer is renamed to `__staticInitializer__` and replaced with one that notifies the
//! runtime, which decides whether to run it.
//!
//! Every instrumented class also gets the `ShadowedObject` marker interface, a
//! `__shadow_data__` field holding its shadow (with the `$$shadow$getData` accessor), overrides
//! of `equals`/`hashCode`/`toString` if those were inherited, and a no-argument constructor if
//! it did not have one. Failures coming out of dispatched code pass through
//! `ShadowRuntime.cleanStackTrace` before being rethrown.
//!
//! Separately, calls to methods configured for interception are replaced everywhere with calls
//! to `ShadowRuntime.intercept`.
//!
//! Instrumenting a class which already implements the marker interface changes nothing.

mod class_instrumentor;
mod code_builder_exts;
mod errors;
mod hooks;

pub use class_instrumentor::*;
pub use code_builder_exts::*;
pub use errors::*;

use crate::config::Configuration;
use crate::jvm::hierarchy::ClassLookup;
use crate::jvm::model::ClassNode;
use crate::jvm::{self, BinaryName, UnqualifiedName};
use log::debug;

/// Prefix of the direct methods holding original code
pub const DIRECT_METHOD_PREFIX: &str = "$$shadow$$";

/// Name of the direct method holding the original code of `method`
pub fn direct_method_name(class: &BinaryName, method: &UnqualifiedName) -> UnqualifiedName {
    method.prefixed(&format!("{}{}$", DIRECT_METHOD_PREFIX, class.mangled()))
}

/// Recover the original method name from the name of a direct method
///
/// Mangled class names contain no `$`, so the original name is whatever follows the first `$`
/// after the prefix.
pub fn original_method_name(name: &str) -> Option<&str> {
    let rest = name.strip_prefix(DIRECT_METHOD_PREFIX)?;
    let (_mangled_class, method) = rest.split_once('$')?;
    Some(method)
}

/// Instrument the class file of `class_name`
///
/// Class name translations from the configuration are applied to every class the code mentions
/// (except the class itself). This does not check [`Configuration::should_transform`]: callers
/// decide which classes to transform.
pub fn transform(
    class_name: &BinaryName,
    bytes: &[u8],
    config: &Configuration,
    lookup: &dyn ClassLookup,
) -> Result<Vec<u8>, TransformError> {
    transform_class(class_name, bytes, config, lookup).map_err(|cause| TransformError {
        class_name: class_name.to_dotted(),
        cause,
    })
}

fn transform_class(
    class_name: &BinaryName,
    bytes: &[u8],
    config: &Configuration,
    lookup: &dyn ClassLookup,
) -> Result<Vec<u8>, TransformCause> {
    let mut class = ClassNode::parse(bytes)?;
    if class.name != *class_name {
        return Err(TransformCause::UnexpectedClassName {
            expected: class_name.to_dotted(),
            found: class.name.to_dotted(),
        });
    }
    if class.interfaces.contains(&BinaryName::SHADOWED_OBJECT) {
        debug!("{} is already instrumented", class_name);
        return Ok(bytes.to_vec());
    }

    debug!("Instrumenting {}", class_name);
    let mapper = config.type_mapper();
    let rename = |name: &BinaryName| {
        if name == class_name {
            name.clone()
        } else {
            mapper.mapped_type_name(name)
        }
    };

    if !mapper.is_empty() {
        class.map_classes(&rename);
    }
    let mut class = ClassInstrumentor::new(config, lookup).instrument(class)?;
    if !mapper.is_empty() {
        class.map_classes(&rename);
    }

    class.write(lookup).map_err(|error| match error {
        jvm::Error::UnknownClass(class) => TransformCause::UnknownClass(class),
        other => TransformCause::ClassFile(other),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::MethodRef as InterceptedMethod;
    use crate::jvm::class_file::{
        AttributeLike, ClassFile, Code, ConstantsPool, StackMapFrame, StackMapTable, Version,
    };
    use crate::jvm::code::{BranchInstruction, Insn, Instruction, MethodBody, OrdComparison, TryCatch};
    use crate::jvm::hierarchy::{jdk_classes, ClassSummary, MethodSummary, NoClasses};
    use crate::jvm::verifier::VerificationType;
    use crate::jvm::model::MethodNode;
    use crate::jvm::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(String::from(name)).unwrap()
    }

    fn unqualified(name: &str) -> UnqualifiedName {
        UnqualifiedName::from_string(String::from(name)).unwrap()
    }

    fn void() -> MethodDescriptor<BinaryName> {
        MethodDescriptor {
            parameters: vec![],
            return_type: None,
        }
    }

    fn super_constructor_call(body: &mut MethodBody) {
        body.push(Instruction::ALoad(0));
        body.push(Insn::invoke_special(BinaryName::OBJECT, UnqualifiedName::INIT, void()));
    }

    /// ```text,ignore,no_run
    /// public final class Clock {
    ///     static { }
    ///     public Clock(long offset) { super(); }
    ///     public long now() { return System.currentTimeMillis(); }
    ///     public static native int nativeId();
    /// }
    /// ```
    fn clock_class() -> Vec<u8> {
        let mut class = ClassNode::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL | ClassAccessFlags::SUPER,
            name("org/example/Clock"),
            Some(BinaryName::OBJECT),
        );

        let mut clinit =
            MethodNode::new(MethodAccessFlags::STATIC, UnqualifiedName::CLINIT, void());
        let mut body = MethodBody::new();
        body.push_return(None);
        clinit.body = Some(body);
        class.methods.push(clinit);

        let mut init = MethodNode::new(
            MethodAccessFlags::PUBLIC,
            UnqualifiedName::INIT,
            MethodDescriptor {
                parameters: vec![FieldType::long()],
                return_type: None,
            },
        );
        let mut body = MethodBody::new();
        super_constructor_call(&mut body);
        body.push_return(None);
        init.body = Some(body);
        class.methods.push(init);

        let long = MethodDescriptor {
            parameters: vec![],
            return_type: Some(FieldType::long()),
        };
        let mut now = MethodNode::new(MethodAccessFlags::PUBLIC, unqualified("now"), long.clone());
        let mut body = MethodBody::new();
        body.push(Insn::invoke_static(
            name("java/lang/System"),
            unqualified("currentTimeMillis"),
            long,
        ));
        body.push_return(Some(&FieldType::long()));
        now.body = Some(body);
        class.methods.push(now);

        class.methods.push(MethodNode::new(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC | MethodAccessFlags::NATIVE,
            unqualified("nativeId"),
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::int()),
            },
        ));

        class.write(&NoClasses).unwrap()
    }

    fn static_method(
        name: &str,
        descriptor: MethodDescriptor<BinaryName>,
        body: MethodBody,
    ) -> MethodNode {
        let mut method = MethodNode::new(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            unqualified(name),
            descriptor,
        );
        method.body = Some(body);
        method
    }

    fn int_to_int() -> MethodDescriptor<BinaryName> {
        MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: Some(FieldType::int()),
        }
    }

    /// ```text,ignore,no_run
    /// public class Inventory {
    ///     static int pick(boolean flag) {
    ///         AbstractList list = flag ? new ArrayList() : new LinkedList();
    ///         return list.size();
    ///     }
    ///     int guarded() {
    ///         try { return count(); } catch (IOException | IllegalStateException e) { return -1; }
    ///     }
    ///     static double mix(long a, double b) {
    ///         double sum = a + b;
    ///         if (a < 0) return 0.0;
    ///         return sum;
    ///     }
    ///     static int classify(int n) {
    ///         switch (n) { case 1: return 10; case 2: return 20; default: return 0; }
    ///     }
    ///     static int rank(int n) {
    ///         switch (n) { case -5: return 1; case 10000: return 2; default: return 3; }
    ///     }
    ///     static void spin(int n) {
    ///         if (n != 0) { n++; n++; /* ... far too many times for a short jump */ }
    ///     }
    /// }
    /// ```
    fn inventory_class() -> ClassNode {
        let mut class = ClassNode::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            name("org/example/Inventory"),
            Some(BinaryName::OBJECT),
        );

        let mut body = MethodBody::new();
        let linked = body.fresh_label();
        let join = body.fresh_label();
        body.push(Instruction::ILoad(0));
        body.push_branch(BranchInstruction::If(OrdComparison::EQ, linked));
        body.push(Instruction::New(RefType::Object(name("java/util/ArrayList"))));
        body.push(Instruction::Dup);
        body.push(Insn::invoke_special(name("java/util/ArrayList"), UnqualifiedName::INIT, void()));
        body.push_branch(BranchInstruction::Goto(join));
        body.place_label(linked);
        body.push(Instruction::New(RefType::Object(name("java/util/LinkedList"))));
        body.push(Instruction::Dup);
        body.push(Insn::invoke_special(name("java/util/LinkedList"), UnqualifiedName::INIT, void()));
        body.place_label(join);
        body.push(Instruction::AStore(1));
        body.push(Instruction::ALoad(1));
        body.push(Insn::invoke_virtual(
            name("java/util/AbstractList"),
            unqualified("size"),
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::int()),
            },
        ));
        body.push_return(Some(&FieldType::int()));
        let pick = MethodDescriptor {
            parameters: vec![FieldType::boolean()],
            return_type: Some(FieldType::int()),
        };
        class.methods.push(static_method("pick", pick, body));

        let mut body = MethodBody::new();
        let start = body.fresh_label();
        let end = body.fresh_label();
        let handler = body.fresh_label();
        body.place_label(start);
        body.push(Instruction::ALoad(0));
        body.push(Insn::invoke_virtual(
            name("org/example/Inventory"),
            unqualified("count"),
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::int()),
            },
        ));
        body.place_label(end);
        body.push_return(Some(&FieldType::int()));
        body.place_label(handler);
        body.push(Instruction::AStore(1));
        body.push(Insn::push_int(-1));
        body.push_return(Some(&FieldType::int()));
        for caught in ["java/io/IOException", "java/lang/IllegalStateException"] {
            body.try_catches.push(TryCatch {
                start,
                end,
                handler,
                catch_type: Some(name(caught)),
            });
        }
        let mut guarded = MethodNode::new(
            MethodAccessFlags::PUBLIC,
            unqualified("guarded"),
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::int()),
            },
        );
        guarded.body = Some(body);
        class.methods.push(guarded);

        let mut body = MethodBody::new();
        let positive = body.fresh_label();
        body.push(Instruction::LLoad(0));
        body.push(Instruction::L2D);
        body.push(Instruction::DLoad(2));
        body.push(Instruction::DAdd);
        body.push(Instruction::DStore(4));
        body.push(Instruction::LLoad(0));
        body.push(Instruction::LConst0);
        body.push(Instruction::LCmp);
        body.push_branch(BranchInstruction::If(OrdComparison::GE, positive));
        body.push(Instruction::DConst0);
        body.push_return(Some(&FieldType::double()));
        body.place_label(positive);
        body.push(Instruction::DLoad(4));
        body.push_return(Some(&FieldType::double()));
        let mix = MethodDescriptor {
            parameters: vec![FieldType::long(), FieldType::double()],
            return_type: Some(FieldType::double()),
        };
        class.methods.push(static_method("mix", mix, body));

        let mut body = MethodBody::new();
        let labels: Vec<_> = (0..3).map(|_| body.fresh_label()).collect();
        body.push(Instruction::ILoad(0));
        body.push_branch(BranchInstruction::TableSwitch {
            padding: 0,
            default: labels[2],
            low: 1,
            targets: vec![labels[0], labels[1]],
        });
        for (label, result) in labels.iter().zip([10, 20, 0]) {
            body.place_label(*label);
            body.push(Insn::push_int(result));
            body.push_return(Some(&FieldType::int()));
        }
        class.methods.push(static_method("classify", int_to_int(), body));

        let mut body = MethodBody::new();
        let labels: Vec<_> = (0..3).map(|_| body.fresh_label()).collect();
        body.push(Instruction::ILoad(0));
        body.push_branch(BranchInstruction::LookupSwitch {
            padding: 0,
            default: labels[2],
            targets: vec![(-5, labels[0]), (10_000, labels[1])],
        });
        for (label, result) in labels.iter().zip([1, 2, 3]) {
            body.place_label(*label);
            body.push(Insn::push_int(result));
            body.push_return(Some(&FieldType::int()));
        }
        class.methods.push(static_method("rank", int_to_int(), body));

        let mut body = MethodBody::new();
        let end = body.fresh_label();
        body.push(Instruction::ILoad(0));
        body.push_branch(BranchInstruction::If(OrdComparison::EQ, end));
        for _ in 0..20_000 {
            body.push(Instruction::IInc(0, 1));
        }
        body.place_label(end);
        body.push_return(None);
        let spin = MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: None,
        };
        class.methods.push(static_method("spin", spin, body));

        class
    }

    fn inventory() -> BinaryName {
        name("org/example/Inventory")
    }

    /// Stack map tables of every method which has one, by method name
    fn stack_map_tables(bytes: &[u8]) -> (ConstantsPool, HashMap<String, StackMapTable>) {
        let class_file = ClassFile::parse(bytes).unwrap();
        let pool = ConstantsPool::from_constants(class_file.constants);
        let mut tables = HashMap::new();
        for method in &class_file.methods {
            let method_name = pool.utf8(method.name_index).unwrap();
            for attribute in &method.attributes {
                if pool.utf8(attribute.name_index).unwrap() != Code::NAME {
                    continue;
                }
                let code: Code = attribute.decode().unwrap();
                for attribute in &code.attributes {
                    if pool.utf8(attribute.name_index).unwrap() == StackMapTable::NAME {
                        tables.insert(String::from(method_name), attribute.decode().unwrap());
                    }
                }
            }
        }
        (pool, tables)
    }

    fn object_frame_class<'a>(pool: &'a ConstantsPool, frame: &StackMapFrame) -> &'a str {
        match frame {
            StackMapFrame::SameLocalsOneStack {
                stack: VerificationType::Object(class),
                ..
            } => pool.class_name(*class).unwrap(),
            other => panic!("expected a single object on the stack, got {:?}", other),
        }
    }

    fn clock() -> BinaryName {
        name("org/example/Clock")
    }

    fn empty_config() -> Configuration {
        Configuration::builder().build().unwrap()
    }

    fn method<'a>(class: &'a ClassNode, signature: &str) -> &'a MethodNode {
        class
            .methods
            .iter()
            .find(|method| method.signature() == signature)
            .unwrap_or_else(|| panic!("no method {} in {:?}", signature, class.method_signatures()))
    }

    fn invoked_methods(method: &MethodNode) -> Vec<String> {
        method
            .body
            .as_ref()
            .unwrap()
            .instructions()
            .filter_map(|insn| match insn {
                Instruction::Invoke(_, method) => Some(format!(
                    "{}.{}",
                    method.class.class_constant_name(),
                    method.name
                )),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn splits_methods() {
        let bytes = transform(&clock(), &clock_class(), &empty_config(), &NoClasses).unwrap();
        let class = ClassNode::parse(&bytes).unwrap();

        assert!(class.interfaces.contains(&BinaryName::SHADOWED_OBJECT));
        assert!(!class.access_flags.contains(ClassAccessFlags::FINAL));
        assert_eq!(
            class.method_signatures(),
            vec![
                "__staticInitializer__()V",
                "<clinit>()V",
                "<init>(J)V",
                "$$shadow$$org_example_Clock$__constructor__(J)V",
                "__constructor__(J)V",
                "$$shadow$$org_example_Clock$now()J",
                "now()J",
                "$$shadow$$org_example_Clock$nativeId()I",
                "nativeId()I",
                "$$shadow$$org_example_Clock$equals(Ljava/lang/Object;)Z",
                "equals(Ljava/lang/Object;)Z",
                "$$shadow$$org_example_Clock$hashCode()I",
                "hashCode()I",
                "$$shadow$$org_example_Clock$toString()Ljava/lang/String;",
                "toString()Ljava/lang/String;",
                "<init>()V",
                "$$shadow$init()V",
                "$$shadow$getData()Ljava/lang/Object;",
            ]
        );

        let direct = method(&class, "$$shadow$$org_example_Clock$now()J");
        assert!(direct.access_flags.contains(MethodAccessFlags::PRIVATE));
        assert_eq!(invoked_methods(direct), vec!["java/lang/System.currentTimeMillis"]);

        let delegator = method(&class, "now()J");
        assert!(delegator.access_flags.contains(MethodAccessFlags::PUBLIC));
        assert_eq!(
            invoked_methods(delegator),
            vec![
                "org/shadowbox/internal/ShadowRuntime.methodInvoked",
                "org/example/Clock.$$shadow$getData",
                "org/shadowbox/internal/Plan.run",
                "java/lang/Long.longValue",
                "org/shadowbox/internal/ShadowRuntime.cleanStackTrace",
                "org/example/Clock.$$shadow$$org_example_Clock$now",
            ]
        );
        assert_eq!(delegator.body.as_ref().unwrap().try_catches.len(), 2);

        // Native methods lose the flag and get a body
        let native = method(&class, "$$shadow$$org_example_Clock$nativeId()I");
        assert!(!native.access_flags.contains(MethodAccessFlags::NATIVE));
        assert!(native.body.is_some());
        let native = method(&class, "nativeId()I");
        assert!(!native.access_flags.contains(MethodAccessFlags::NATIVE));
        assert!(native.access_flags.contains(MethodAccessFlags::STATIC));

        let data = &class.fields[0];
        assert_eq!(data.name, UnqualifiedName::SHADOW_DATA);
        assert_eq!(data.descriptor, FieldType::object(BinaryName::OBJECT));
    }

    #[test]
    fn constructors_keep_super_call() {
        let bytes = transform(&clock(), &clock_class(), &empty_config(), &NoClasses).unwrap();
        let class = ClassNode::parse(&bytes).unwrap();

        assert_eq!(
            invoked_methods(method(&class, "<init>(J)V")),
            vec![
                "java/lang/Object.<init>",
                "org/example/Clock.$$shadow$init",
                "org/shadowbox/internal/ShadowRuntime.methodInvoked",
                "org/example/Clock.$$shadow$getData",
                "java/lang/Long.valueOf",
                "org/shadowbox/internal/Plan.run",
                "org/shadowbox/internal/ShadowRuntime.cleanStackTrace",
                "org/example/Clock.$$shadow$$org_example_Clock$__constructor__",
            ]
        );
        assert!(invoked_methods(method(&class, "$$shadow$$org_example_Clock$__constructor__(J)V"))
            .is_empty());
        assert_eq!(
            invoked_methods(method(&class, "__constructor__(J)V")),
            vec!["org/example/Clock.$$shadow$$org_example_Clock$__constructor__"]
        );
        assert_eq!(
            invoked_methods(method(&class, "<init>()V")),
            vec!["java/lang/Object.<init>", "org/example/Clock.$$shadow$init"]
        );
        assert_eq!(
            invoked_methods(method(&class, "<clinit>()V")),
            vec!["org/shadowbox/internal/ShadowRuntime.classInitializing"]
        );
    }

    #[test]
    fn constructor_without_super_call() {
        let mut class = ClassNode::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC,
            name("org/example/Broken"),
            Some(BinaryName::OBJECT),
        );
        let mut init = MethodNode::new(MethodAccessFlags::PUBLIC, UnqualifiedName::INIT, void());
        let mut body = MethodBody::new();
        body.push_return(None);
        init.body = Some(body);
        class.methods.push(init);

        let bytes = class.write(&NoClasses).unwrap();

        let error = transform(&name("org/example/Broken"), &bytes, &empty_config(), &NoClasses)
            .unwrap_err();
        assert_eq!(error.class_name, "org.example.Broken");
        assert!(matches!(
            error.cause,
            TransformCause::MissingSuperConstructorCall(_)
        ));
    }

    #[test]
    fn instrumenting_twice_changes_nothing() {
        let config = empty_config();
        let once = transform(&clock(), &clock_class(), &config, &NoClasses).unwrap();
        let twice = transform(&clock(), &once, &config, &NoClasses).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn final_classes_are_not_mockable() {
        let bytes = transform(&clock(), &clock_class(), &empty_config(), &NoClasses).unwrap();
        let class = ClassNode::parse(&bytes).unwrap();
        assert_eq!(class.annotations().unwrap(), vec![BinaryName::DO_NOT_MOCK]);
    }

    #[test]
    fn interfaces_are_only_marked() {
        let mut class = ClassNode::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
            name("org/example/Ticker"),
            Some(BinaryName::OBJECT),
        );
        class.methods.push(MethodNode::new(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            unqualified("tick"),
            void(),
        ));
        let bytes = class.write(&NoClasses).unwrap();

        let transformed =
            transform(&name("org/example/Ticker"), &bytes, &empty_config(), &NoClasses).unwrap();
        let class = ClassNode::parse(&transformed).unwrap();
        assert_eq!(class.interfaces, vec![BinaryName::SHADOWED_OBJECT]);
        assert_eq!(class.method_signatures(), vec!["tick()V"]);
        assert!(class.fields.is_empty());
    }

    #[test]
    fn intercepts_configured_calls() {
        let config = Configuration::builder()
            .add_intercepted_method(InterceptedMethod::new("java.lang.System", "currentTimeMillis"))
            .build()
            .unwrap();
        let bytes = transform(&clock(), &clock_class(), &config, &NoClasses).unwrap();
        let class = ClassNode::parse(&bytes).unwrap();

        assert_eq!(
            invoked_methods(method(&class, "$$shadow$$org_example_Clock$now()J")),
            vec![
                "org/shadowbox/internal/ShadowRuntime.intercept",
                "java/lang/Long.longValue",
            ]
        );
    }

    #[test]
    fn final_object_methods_are_not_overridden() {
        let base = name("org/example/Base");
        let mut lookup = HashMap::new();
        lookup.insert(
            base.clone(),
            Arc::new(ClassSummary {
                name: base.clone(),
                super_class: Some(BinaryName::OBJECT),
                interfaces: vec![],
                access_flags: ClassAccessFlags::PUBLIC,
                methods: vec![MethodSummary {
                    name: UnqualifiedName::HASHCODE,
                    descriptor: String::from("()I"),
                    access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::FINAL,
                }],
            }),
        );

        let mut class = ClassNode::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            name("org/example/Derived"),
            Some(base.clone()),
        );
        let mut init = MethodNode::new(MethodAccessFlags::PUBLIC, UnqualifiedName::INIT, void());
        let mut body = MethodBody::new();
        body.push(Instruction::ALoad(0));
        body.push(Insn::invoke_special(base, UnqualifiedName::INIT, void()));
        body.push_return(None);
        init.body = Some(body);
        class.methods.push(init);
        let bytes = class.write(&lookup).unwrap();

        let transformed =
            transform(&name("org/example/Derived"), &bytes, &empty_config(), &lookup).unwrap();
        let class = ClassNode::parse(&transformed).unwrap();
        let signatures = class.method_signatures();
        assert!(signatures.contains(&String::from("equals(Ljava/lang/Object;)Z")));
        assert!(!signatures.contains(&String::from("hashCode()I")));
    }

    #[test]
    fn merges_need_the_class_hierarchy() {
        let bytes = inventory_class().write(&jdk_classes()).unwrap();

        let error = transform(&inventory(), &bytes, &empty_config(), &NoClasses).unwrap_err();
        assert_eq!(error.class_name, "org.example.Inventory");
        assert!(matches!(error.cause, TransformCause::UnknownClass(_)));

        assert!(transform(&inventory(), &bytes, &empty_config(), &jdk_classes()).is_ok());
    }

    #[test]
    fn frames_of_rewritten_control_flow() {
        let originals = inventory_class().methods;
        let bytes = inventory_class().write(&jdk_classes()).unwrap();
        let transformed = transform(&inventory(), &bytes, &empty_config(), &jdk_classes()).unwrap();

        let (pool, tables) = stack_map_tables(&transformed);
        let direct = |method: &str| format!("$$shadow$$org_example_Inventory${}", method);

        let pick = &tables[&direct("pick")].0;
        assert_eq!(pick.len(), 2);
        assert_eq!(object_frame_class(&pool, &pick[1]), "java/util/AbstractList");

        let guarded = &tables[&direct("guarded")].0;
        assert_eq!(guarded.len(), 1);
        assert_eq!(object_frame_class(&pool, &guarded[0]), "java/lang/Exception");

        assert!(matches!(
            tables[&direct("mix")].0.as_slice(),
            [StackMapFrame::AppendLocalsNoStack { locals, .. }]
                if locals == &[VerificationType::Double]
        ));
        assert_eq!(tables[&direct("classify")].0.len(), 3);
        assert_eq!(tables[&direct("rank")].0.len(), 3);
        assert_eq!(
            tables[&direct("spin")].0,
            vec![
                StackMapFrame::SameLocalsNoStack { offset_delta: 9 },
                StackMapFrame::SameLocalsNoStack {
                    offset_delta: 20_000 * 3 - 1
                },
            ]
        );

        // Original bodies survive in the direct methods
        let class = ClassNode::parse(&transformed).unwrap();
        for original in &originals {
            let signature = original.signature();
            let moved = method(&class, &format!("{}{}", direct(""), signature));
            let instructions = |method: &MethodNode| {
                method
                    .body
                    .as_ref()
                    .unwrap()
                    .instructions()
                    .map(|insn| format!("{:?}", insn))
                    .collect::<Vec<_>>()
            };
            assert_eq!(instructions(moved), instructions(original), "{}", signature);
        }
    }

    #[test]
    fn translates_class_names() {
        let config = Configuration::builder()
            .add_class_name_translation("java.lang.System", "org.example.FakeSystem")
            .build()
            .unwrap();
        let bytes = transform(&clock(), &clock_class(), &config, &NoClasses).unwrap();
        let class = ClassNode::parse(&bytes).unwrap();
        assert_eq!(class.name, clock());
        assert_eq!(
            invoked_methods(method(&class, "$$shadow$$org_example_Clock$now()J")),
            vec!["org/example/FakeSystem.currentTimeMillis"]
        );
    }

    #[test]
    fn wrong_class_name() {
        let other = name("org/example/Other");
        let error = transform(&other, &clock_class(), &empty_config(), &NoClasses).unwrap_err();
        assert!(matches!(
            error.cause,
            TransformCause::UnexpectedClassName { .. }
        ));
    }

    #[test]
    fn direct_method_names() {
        let direct = direct_method_name(&name("org/example/Clock$Tick"), &unqualified("now"));
        assert_eq!(direct.as_str(), "$$shadow$$org_example_Clock_Tick$now");
        assert_eq!(original_method_name(direct.as_str()), Some("now"));
        assert_eq!(original_method_name("access$000"), None);
    }
}
