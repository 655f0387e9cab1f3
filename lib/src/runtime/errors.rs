use super::Failure;
use crate::jvm;
use thiserror::Error;

/// Shadow that can't be used as declared
///
/// These are reported the first time the shadow is resolved.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("missing public empty constructor on {shadow_class} (shadowing {real_class})")]
    MissingShadowConstructor {
        shadow_class: String,
        real_class: String,
    },

    #[error("constructor shadow {shadow_class}.{method} must not be static")]
    StaticConstructorShadow { shadow_class: String, method: String },

    #[error("static initializer shadow {shadow_class}.__staticInitializer__() must be static")]
    NonStaticInitializerShadow { shadow_class: String },

    #[error("real object field {shadow_class}.{field} must not be static")]
    StaticRealObjectField { shadow_class: String, field: String },
}

/// Anything that can go wrong while running a call through the dispatcher
#[derive(Debug, Error)]
pub enum InvokeError {
    /// Thrown by a shadow or by real code, after cleaning
    #[error("{0}")]
    Thrown(Failure),

    /// No interceptor for an intercepted call site (only with strict default values)
    #[error("no interceptor registered for {0}")]
    NoInterceptor(String),

    /// Shadow does nothing for the method (only with strict default values)
    #[error("no implementation for {0}")]
    NoImplementation(String),

    #[error("{0}")]
    Resolution(#[from] ResolutionError),

    #[error("malformed call site: {0}")]
    BadSignature(#[from] jvm::Error),
}
