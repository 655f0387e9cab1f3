use super::{Failure, MethodSignature, Value};
use crate::config::{ConfigurationBuilder, MethodRef, ANY_METHOD};
use crate::jvm::{BinaryName, Name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Replacement for an intercepted call: `(calling class, receiver, arguments) -> result`
///
/// The receiver is `None` for static methods.
pub type InterceptorFn =
    Arc<dyn Fn(&BinaryName, Option<&Value>, &[Value]) -> Result<Value, Failure> + Send + Sync>;

/// Direct callable which a call site can bind to instead of going through the handler
pub type MethodHandleFn = Arc<dyn Fn(&[Value]) -> Result<Value, Failure> + Send + Sync>;

/// Behaviour substituted at call instructions targeting some methods
///
/// This is for methods that don't exist in the sandbox at all (eg. JDK internals that the
/// platform would normally provide), as opposed to methods that exist but have a shadow.
#[derive(Clone)]
pub struct Interceptor {
    methods: Vec<MethodRef>,
    handler: InterceptorFn,
    method_handle: Option<MethodHandleFn>,
}

impl Interceptor {
    pub fn new<F>(methods: Vec<MethodRef>, handler: F) -> Interceptor
    where
        F: Fn(&BinaryName, Option<&Value>, &[Value]) -> Result<Value, Failure>
            + Send
            + Sync
            + 'static,
    {
        Interceptor {
            methods,
            handler: Arc::new(handler),
            method_handle: None,
        }
    }

    pub fn with_method_handle<F>(mut self, method_handle: F) -> Interceptor
    where
        F: Fn(&[Value]) -> Result<Value, Failure> + Send + Sync + 'static,
    {
        self.method_handle = Some(Arc::new(method_handle));
        self
    }

    pub fn methods(&self) -> &[MethodRef] {
        &self.methods
    }

    pub fn handler(&self) -> &InterceptorFn {
        &self.handler
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("methods", &self.methods)
            .field("method_handle", &self.method_handle.is_some())
            .finish()
    }
}

/// Immutable registry of interceptors, by intercepted method
#[derive(Clone, Debug, Default)]
pub struct Interceptors {
    by_method: HashMap<MethodRef, Arc<Interceptor>>,
}

impl Interceptors {
    pub fn new(interceptors: impl IntoIterator<Item = Interceptor>) -> Interceptors {
        let mut by_method = HashMap::new();
        for interceptor in interceptors {
            let interceptor = Arc::new(interceptor);
            for method in &interceptor.methods {
                by_method.insert(method.clone(), interceptor.clone());
            }
        }
        Interceptors { by_method }
    }

    pub fn is_empty(&self) -> bool {
        self.by_method.is_empty()
    }

    /// Every intercepted method, in no particular order
    pub fn all_method_refs(&self) -> impl Iterator<Item = &MethodRef> {
        self.by_method.keys()
    }

    /// Register every intercepted method with a configuration, so that calls get rewritten
    pub fn configure(&self, builder: ConfigurationBuilder) -> ConfigurationBuilder {
        let mut methods: Vec<&MethodRef> = self.all_method_refs().collect();
        methods.sort();
        methods.into_iter().fold(builder, |builder, method| {
            builder.add_intercepted_method(method.clone())
        })
    }

    /// Interceptor for a method, trying the exact method before the class wildcard
    pub fn find_interceptor(
        &self,
        class_name: &str,
        method_name: &str,
    ) -> Option<&Arc<Interceptor>> {
        self.by_method
            .get(&MethodRef::new(class_name, method_name))
            .or_else(|| self.by_method.get(&MethodRef::new(class_name, ANY_METHOD)))
    }

    pub fn get_interception_handler(&self, signature: &MethodSignature) -> Option<&InterceptorFn> {
        self.find_interceptor(
            &signature.class_name.to_dotted(),
            signature.method_name.as_str(),
        )
        .map(|interceptor| &interceptor.handler)
    }

    pub fn method_handle_for(&self, signature: &MethodSignature) -> Option<&MethodHandleFn> {
        self.find_interceptor(
            &signature.class_name.to_dotted(),
            signature.method_name.as_str(),
        )
        .and_then(|interceptor| interceptor.method_handle.as_ref())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Configuration;
    use crate::jvm::{Name, UnqualifiedName};

    fn interceptors() -> Interceptors {
        Interceptors::new(vec![
            Interceptor::new(
                vec![MethodRef::new("java.lang.System", "nanoTime")],
                |_, _, _| Ok(Value::Long(1_000)),
            )
            .with_method_handle(|_| Ok(Value::Long(2_000))),
            Interceptor::new(
                vec![MethodRef::any_method("java.util.logging.Logger")],
                |_, _, _| Ok(Value::Void),
            ),
        ])
    }

    #[test]
    fn finds_exact_then_wildcard_handlers() {
        let interceptors = interceptors();
        let caller = BinaryName::from_string(String::from("org/example/Clock")).unwrap();

        let nano_time = MethodSignature::parse("java/lang/System/nanoTime()J").unwrap();
        let handler = interceptors.get_interception_handler(&nano_time).unwrap();
        assert_eq!(handler(&caller, None, &[]).unwrap(), Value::Long(1_000));
        let handle = interceptors.method_handle_for(&nano_time).unwrap();
        assert_eq!(handle(&[]).unwrap(), Value::Long(2_000));

        let log = MethodSignature::parse("java/util/logging/Logger/info(Ljava/lang/String;)V")
            .unwrap();
        assert!(interceptors.get_interception_handler(&log).is_some());
        assert!(interceptors.method_handle_for(&log).is_none());

        let millis = MethodSignature::parse("java/lang/System/currentTimeMillis()J").unwrap();
        assert!(interceptors.get_interception_handler(&millis).is_none());
    }

    #[test]
    fn configures_intercepted_calls() {
        let config = interceptors()
            .configure(Configuration::builder())
            .build()
            .unwrap();
        let system = BinaryName::from_string(String::from("java/lang/System")).unwrap();
        let logger = BinaryName::from_string(String::from("java/util/logging/Logger")).unwrap();
        let nano_time = UnqualifiedName::from_string(String::from("nanoTime")).unwrap();
        let warning = UnqualifiedName::from_string(String::from("warning")).unwrap();
        assert!(config.should_intercept(&system, &nano_time));
        assert!(config.should_intercept(&logger, &warning));
        assert!(!config.should_intercept(&system, &warning));
    }
}
