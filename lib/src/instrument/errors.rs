use crate::jvm;
use thiserror::Error;

/// Rewriting one class failed
///
/// This is fatal for that class only.
#[derive(Debug, Error)]
#[error("cannot transform {class_name}: {cause}")]
pub struct TransformError {
    /// Dotted name of the class
    pub class_name: String,

    #[source]
    pub cause: TransformCause,
}

#[derive(Debug, Error)]
pub enum TransformCause {
    /// The class file could not be read or written back
    #[error(transparent)]
    ClassFile(#[from] jvm::Error),

    #[error("constructor {0} does not call a super constructor")]
    MissingSuperConstructorCall(String),

    #[error("expected {expected} but the class file is for {found}")]
    UnexpectedClassName { expected: String, found: String },

    /// Frames could not be computed because a class the code mentions is not known
    #[error("class {0} is needed to compute stack map frames but can't be found")]
    UnknownClass(String),
}
