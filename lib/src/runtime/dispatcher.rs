use super::{
    Failure, InvokeError, Interceptors, MethodSignature, ObjectRef, Plan, ResolutionError,
    Settings, ShadowData, ShadowMethodPlan, StackFrame, Value,
};
use crate::instrument::original_method_name;
use crate::jvm::hierarchy::ClassLookup;
use crate::jvm::{BinaryName, FieldType, UnqualifiedName};
use crate::shadow::{
    Invocation, ResolvedShadow, ShadowClass, ShadowInstance, ShadowMap, ShadowMethod, ShadowRef,
};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Frames of classes under these prefixes are dropped from failures
const INTERNAL_FRAME_PREFIXES: [&str; 4] = [
    "org.shadowbox.internal.",
    "sun.reflect.",
    "java.lang.reflect.",
    "jdk.internal.reflect.",
];

/// Token that goes stale once the shadow of its class changes
#[derive(Debug, Default)]
struct Guard {
    stale: AtomicBool,
}

impl Guard {
    fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    fn invalidate(&self) {
        self.stale.store(true, Ordering::Release);
    }
}

/// Cached plan of a call site, along with the guards of every class consulted to compute it
#[derive(Clone, Debug)]
struct Binding {
    plan: Plan,
    guards: Vec<Arc<Guard>>,
}

impl Binding {
    fn is_current(&self) -> bool {
        self.guards.iter().all(|guard| !guard.is_stale())
    }
}

/// Decides what instrumented code runs, and caches those decisions per call site
///
/// The registry of shadows is an immutable [`ShadowMap`] snapshot which can be swapped at any
/// time with [`Dispatcher::install_registry`]. Every cached plan holds guard tokens for the real
/// classes consulted while computing it, and a swap invalidates exactly the tokens of classes
/// whose shadow changed. Calls that already obtained their plan finish with it.
pub struct Dispatcher {
    settings: Settings,
    classes: Arc<dyn ClassLookup>,
    registry: ArcSwap<ShadowMap>,
    interceptors: Interceptors,

    /// Current guard of each real class consulted so far
    guards: DashMap<BinaryName, Arc<Guard>>,

    /// Plans keyed by call site (`owner/name(descriptor)`)
    bindings: DashMap<String, Binding>,

    /// Serializes registry installs
    install_lock: Mutex<()>,
}

impl Dispatcher {
    pub fn new(
        settings: Settings,
        classes: Arc<dyn ClassLookup>,
        registry: ShadowMap,
        interceptors: Interceptors,
    ) -> Dispatcher {
        Dispatcher {
            settings,
            classes,
            registry: ArcSwap::from_pointee(registry),
            interceptors,
            guards: DashMap::new(),
            bindings: DashMap::new(),
            install_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn interceptors(&self) -> &Interceptors {
        &self.interceptors
    }

    /// Current registry snapshot
    pub fn registry(&self) -> Arc<ShadowMap> {
        self.registry.load_full()
    }

    /// Number of call sites with a cached plan (current or stale)
    pub fn cached_plans(&self) -> usize {
        self.bindings.len()
    }

    /// Swap in a new registry, returning the real classes whose shadow changed
    ///
    /// Plans computed against any of those classes are recomputed on their next use.
    pub fn install_registry(&self, registry: ShadowMap) -> BTreeSet<BinaryName> {
        let _install = self.install_lock.lock();
        let registry = Arc::new(registry);
        let previous = self.registry.swap(registry.clone());
        let changed = previous.diff(&registry);

        // Shadows can also apply to classes through their simple name
        let simple_names: HashSet<&str> = changed.iter().map(|class| class.simple_name()).collect();
        let mut invalidated = 0;
        for mut entry in self.guards.iter_mut() {
            if changed.contains(entry.key()) || simple_names.contains(entry.key().simple_name()) {
                entry.value().invalidate();
                *entry.value_mut() = Arc::new(Guard::default());
                invalidated += 1;
            }
        }

        info!(
            "Installed registry of {} shadows ({} classes changed, {} invalidated)",
            registry.len(),
            changed.len(),
            invalidated
        );
        changed
    }

    fn guard_for(&self, class: &BinaryName) -> Arc<Guard> {
        self.guards
            .entry(class.clone())
            .or_insert_with(|| Arc::new(Guard::default()))
            .value()
            .clone()
    }

    /// Hook run by the static initializer of an instrumented class
    ///
    /// Runs the shadow's `__staticInitializer__()` if the class's own shadow declares one, and
    /// otherwise the original static initializer.
    pub fn on_class_initializing(
        &self,
        class: &BinaryName,
        run_original: impl FnOnce() -> Result<(), Failure>,
    ) -> Result<(), InvokeError> {
        let snapshot = self.registry.load_full();
        let mut consulted = vec![];
        let resolved = snapshot
            .lookup_tracking(class, self.settings.api_level, &*self.classes, &mut consulted)
            .filter(|_| consulted.len() == 1);
        let initializer = resolved.as_ref().and_then(|resolved| {
            self.find_shadow_method(resolved, &UnqualifiedName::STATIC_INITIALIZER, &[])
        });

        let result = match initializer {
            Some((shadow_class, method)) => {
                if !method.is_static() {
                    return Err(ResolutionError::NonStaticInitializerShadow {
                        shadow_class: shadow_class.name().to_dotted(),
                    }
                    .into());
                }
                debug!("Initializing {} with {}", class, shadow_class.name());
                let invocation = Invocation {
                    this: None,
                    shadow: None,
                    arguments: &[],
                };
                method.invoke(&invocation).map(drop)
            }
            None => run_original(),
        };
        result.map_err(|failure| InvokeError::Thrown(self.on_failure_propagate(failure)))
    }

    /// Hook run once per instance, by the per-instance initializer
    ///
    /// Creates the shadow (if the class has one) and injects the instance into its real object
    /// fields. The shadow data is set at most once, so later calls return the same data.
    pub fn on_instance_initializing(
        &self,
        instance: &ObjectRef,
    ) -> Result<ShadowData, ResolutionError> {
        if let Some(data) = instance.shadow_data() {
            return Ok(data.clone());
        }

        let snapshot = self.registry.load_full();
        let data = match snapshot.lookup(
            instance.class_name(),
            self.settings.api_level,
            &*self.classes,
        ) {
            None => ShadowData::NoShadow,
            Some(resolved) => {
                let shadow = create_shadow(&resolved)?;
                for (_, field) in resolved.class.real_object_fields() {
                    shadow.inject_real_object(&field.name, instance);
                }
                trace!("Created {:?} for {:?}", shadow, instance);
                ShadowData::Shadow(shadow)
            }
        };
        Ok(instance.init_shadow_data(|| data).clone())
    }

    /// Hook run by every dispatch stub: what should this call site run?
    pub fn on_method_invoked(
        &self,
        signature: &str,
        is_static: bool,
        class: &BinaryName,
    ) -> Result<Plan, InvokeError> {
        let cached = self
            .bindings
            .get(signature)
            .filter(|binding| binding.is_current())
            .map(|binding| binding.plan.clone());
        if let Some(plan) = cached {
            return Ok(plan);
        }

        let snapshot = self.registry.load_full();
        let method = MethodSignature::parse(signature)?;
        let mut consulted = vec![];
        let plan = self.calculate_plan(&snapshot, &method, is_static, class, &mut consulted)?;
        let guards = consulted.iter().map(|class| self.guard_for(class)).collect();

        // A plan computed against a registry that has since been replaced is used, not cached
        if Arc::ptr_eq(&*self.registry.load(), &snapshot) {
            self.bindings.insert(
                String::from(signature),
                Binding {
                    plan: plan.clone(),
                    guards,
                },
            );
        }
        trace!("{} => {}", signature, plan.describe());
        Ok(plan)
    }

    /// Decide what a call to `method` on `class` runs
    ///
    /// When the shadow was found through a super class of `class` and it has no method for
    /// `method`, the real code runs even if that shadow does not call through by default: the
    /// shadow only stands in for its own class.
    fn calculate_plan(
        &self,
        snapshot: &ShadowMap,
        method: &MethodSignature,
        is_static: bool,
        class: &BinaryName,
        consulted: &mut Vec<BinaryName>,
    ) -> Result<Plan, ResolutionError> {
        let api_level = self.settings.api_level;
        let resolved = match snapshot.lookup_tracking(class, api_level, &*self.classes, consulted) {
            Some(resolved) => resolved,
            None => return Ok(Plan::CallReal),
        };

        let found =
            self.find_shadow_method(&resolved, &method.method_name, &method.descriptor.parameters);
        match found {
            Some((shadow_class, shadow_method)) => {
                let is_constructor = method.is_constructor();
                if is_constructor && shadow_method.is_static() {
                    return Err(ResolutionError::StaticConstructorShadow {
                        shadow_class: shadow_class.name().to_dotted(),
                        method: shadow_method.signature(),
                    });
                }
                if is_static != shadow_method.is_static() {
                    trace!(
                        "{} is shadowed by {}.{} (static mismatch)",
                        method,
                        shadow_class.name(),
                        shadow_method.signature()
                    );
                }
                Ok(Plan::Shadow(Arc::new(ShadowMethodPlan::new(
                    shadow_class,
                    shadow_method,
                    !is_constructor,
                ))))
            }

            // Shadows found through a super class don't stop the class's own code from running
            None if consulted.len() > 1 => Ok(Plan::CallReal),
            None if resolved.info.call_through_by_default => Ok(Plan::CallReal),
            None => Ok(Plan::DoNothing),
        }
    }

    /// Find the shadow method substituting `name(parameters)`
    ///
    /// The search starts on the resolved shadow class and continues up its super classes as long
    /// as they shadow the same real class at the current version.
    fn find_shadow_method(
        &self,
        resolved: &ResolvedShadow,
        name: &UnqualifiedName,
        parameters: &[FieldType<BinaryName>],
    ) -> Option<(Arc<ShadowClass>, ShadowMethod)> {
        let api_level = self.settings.api_level;
        let real_class = &resolved.info.real_class;
        let loose_parameters = vec![FieldType::object(BinaryName::OBJECT); parameters.len()];

        let mut current = Some(resolved.class.clone());
        while let Some(shadow_class) = current {
            let loose = shadow_class
                .info()
                .map_or(false, |info| info.loose_signatures);
            let method = shadow_class
                .declared_method(name, parameters, api_level)
                .or_else(|| {
                    if loose {
                        shadow_class.declared_method(name, &loose_parameters, api_level)
                    } else {
                        None
                    }
                })
                .cloned();
            if let Some(method) = method {
                return Some((shadow_class, method));
            }

            current = shadow_class
                .super_class()
                .filter(|super_class| {
                    super_class.info().map_or(false, |info| {
                        info.is_shadow_of(real_class) && info.supports_sdk(api_level)
                    })
                })
                .cloned();
        }
        None
    }

    /// Hook run on failures leaving a dispatch stub
    ///
    /// Frames of the runtime's own relay classes and of reflection are removed, direct method
    /// names are turned back into the original names, and adjacent duplicates of the same frame
    /// without line numbers are collapsed. Causes are cleaned the same way.
    pub fn on_failure_propagate(&self, failure: Failure) -> Failure {
        clean_stack_trace(failure)
    }

    /// Hook run instead of an intercepted call
    ///
    /// Without an interceptor, this returns the zero value of the method's return type (or fails,
    /// with strict default values).
    pub fn on_intercepted_call(
        &self,
        signature: &str,
        receiver: Option<&Value>,
        arguments: &[Value],
        caller: &BinaryName,
    ) -> Result<Value, InvokeError> {
        let method = MethodSignature::parse(signature)?;
        match self.interceptors.get_interception_handler(&method) {
            Some(handler) => handler(caller, receiver, arguments)
                .map_err(|failure| InvokeError::Thrown(self.on_failure_propagate(failure))),
            None if self.settings.strict_default_values => {
                Err(InvokeError::NoInterceptor(String::from(signature)))
            }
            None => {
                warn!("No interceptor for {}, returning a default value", signature);
                Ok(Value::default_for(method.descriptor.return_type.as_ref()))
            }
        }
    }

    /// Run a call through its dispatch stub, the way generated code does
    ///
    /// `direct` runs the original code of the method.
    pub fn invoke(
        &self,
        signature: &str,
        is_static: bool,
        class: &BinaryName,
        this: Option<&ObjectRef>,
        arguments: &[Value],
        direct: impl FnOnce(&[Value]) -> Result<Value, Failure>,
    ) -> Result<Value, InvokeError> {
        let result = match self.on_method_invoked(signature, is_static, class)? {
            Plan::CallReal => direct(arguments),
            Plan::DoNothing => {
                if self.settings.strict_default_values {
                    return Err(InvokeError::NoImplementation(String::from(signature)));
                }
                let method = MethodSignature::parse(signature)?;
                Ok(Value::default_for(method.descriptor.return_type.as_ref()))
            }
            Plan::Shadow(plan) => {
                let shadow = this.and_then(|this| this.shadow());
                plan.run(this, shadow, arguments)
            }
        };
        result.map_err(|failure| InvokeError::Thrown(self.on_failure_propagate(failure)))
    }
}

fn create_shadow(resolved: &ResolvedShadow) -> Result<ShadowRef, ResolutionError> {
    let class = &resolved.class;
    if !class.has_default_constructor() {
        return Err(ResolutionError::MissingShadowConstructor {
            shadow_class: class.name().to_dotted(),
            real_class: resolved.info.real_class.to_dotted(),
        });
    }
    if let Some((owner, field)) = class.real_object_fields().find(|(_, field)| field.is_static) {
        return Err(ResolutionError::StaticRealObjectField {
            shadow_class: owner.to_dotted(),
            field: field.name.clone(),
        });
    }
    Ok(ShadowInstance::new(class.clone()))
}

fn is_internal_frame(frame: &StackFrame) -> bool {
    INTERNAL_FRAME_PREFIXES
        .iter()
        .any(|prefix| frame.class_name.starts_with(prefix))
}

fn clean_stack_trace(mut failure: Failure) -> Failure {
    let mut frames: Vec<StackFrame> = Vec::with_capacity(failure.frames.len());
    for mut frame in std::mem::take(&mut failure.frames) {
        if is_internal_frame(&frame) {
            continue;
        }
        if let Some(original) = original_method_name(&frame.method_name) {
            frame.method_name = String::from(original);
        }
        let duplicate = frames.last().map_or(false, |previous| {
            frame.line < 0
                && frame.file_name.is_some()
                && previous.file_name == frame.file_name
                && previous.class_name == frame.class_name
                && previous.method_name == frame.method_name
        });
        if !duplicate {
            frames.push(frame);
        }
    }
    failure.frames = frames;
    failure.cause = failure
        .cause
        .map(|cause| Box::new(clean_stack_trace(*cause)));
    failure
}
