use crate::instrument::TransformError;
use crate::jvm;
use std::io;
use thiserror::Error;

/// Loading a class into a namespace failed
///
/// Failures concern a single class: other classes keep loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("class {0} not found")]
    NotFound(String),

    #[error("cannot read {name}: {error}")]
    Io {
        name: String,
        #[source]
        error: io::Error,
    },

    #[error("malformed class file for {class_name}: {cause}")]
    Malformed {
        class_name: String,
        #[source]
        cause: jvm::Error,
    },

    #[error(transparent)]
    Transform(#[from] TransformError),
}
