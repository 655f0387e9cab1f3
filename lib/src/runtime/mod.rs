//! What instrumented code calls into at runtime
//!
//! Generated code calls static methods of `org/shadowbox/internal/ShadowRuntime`, which forward
//! to a [`Dispatcher`]:
//!
//!   - `classInitializing(Class)` ([`Dispatcher::on_class_initializing`])
//!   - `initializing(Object) -> Object` ([`Dispatcher::on_instance_initializing`])
//!   - `methodInvoked(String, boolean, Class) -> Plan` ([`Dispatcher::on_method_invoked`])
//!   - `cleanStackTrace(Throwable) -> Throwable` ([`Dispatcher::on_failure_propagate`])
//!   - `intercept(String, Object, Object[], Class) -> Object` ([`Dispatcher::on_intercepted_call`])
//!
//! Objects, values, and throwables are modelled by [`Instance`], [`Value`], and [`Failure`], so
//! that the dispatcher can be driven (and tested) without a JVM. [`Dispatcher::invoke`] runs the
//! whole protocol of a dispatch stub.

mod dispatcher;
mod errors;
mod failure;
mod interceptors;
mod plan;
mod settings;
mod signature;
mod value;

pub use dispatcher::*;
pub use errors::*;
pub use failure::*;
pub use interceptors::*;
pub use plan::*;
pub use settings::*;
pub use signature::*;
pub use value::*;
