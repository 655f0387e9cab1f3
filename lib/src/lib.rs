//! Load-time rewriting of JVM classes, so that tests can substitute _shadow_ implementations for
//! the methods of classes they don't control
//!
//! The pieces fit together as follows:
//!
//!   - a [`config::Configuration`] says which classes get rewritten, which ones come from the
//!     host, and which calls get intercepted
//!   - a [`loader::SandboxNamespace`] loads classes, rewriting them with [`instrument::transform`]
//!     so that every method asks the runtime what to run
//!   - a [`shadow::ShadowMap`] says which [`shadow::ShadowClass`] substitutes which real class at
//!     which platform version
//!   - a [`runtime::Dispatcher`] answers the rewritten code, caching its decisions per call site
//!     until the registry changes
//!
//! ### Example
//!
//! ```no_run
//! use shadowbox::config::Configuration;
//! use shadowbox::loader::{DirectorySource, JarSource, SandboxNamespace, SharedHost};
//! use shadowbox::runtime::{Dispatcher, Interceptors, Settings, Value};
//! use shadowbox::shadow::{ShadowClass, ShadowMap, ShadowProvider};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Configuration::builder()
//!     .add_instrumented_package("org.example")
//!     .build()?;
//! let namespace = Arc::new(SandboxNamespace::new(
//!     config,
//!     vec![Box::new(DirectorySource::new("build/classes"))],
//!     Arc::new(SharedHost::new(vec![Box::new(JarSource::open("android-all.jar")?)])),
//! ));
//! let clock = namespace.load_class_dotted("org.example.Clock")?;
//!
//! let shadow = ShadowClass::builder("org.example.ShadowClock")
//!     .implements("org.example.Clock")
//!     .static_implementation("now()J", |_| Ok(Value::Long(42)))
//!     .build()?;
//! let provider = ShadowProvider::new("example", 0).shadow(shadow);
//! let registry = ShadowMap::from_providers(vec![provider])?;
//! let dispatcher = Dispatcher::new(
//!     Settings::default(),
//!     namespace.clone(),
//!     registry,
//!     Interceptors::default(),
//! );
//!
//! let now = dispatcher.invoke("org/example/Clock/now()J", true, &clock.name, None, &[], |_| {
//!     Ok(Value::Long(0))
//! })?;
//! assert_eq!(now, Value::Long(42));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod instrument;
pub mod jvm;
pub mod loader;
pub mod runtime;
pub mod shadow;
pub mod util;
