//! Isolated namespaces into which classes are loaded (and rewritten)
//!
//! A [`SandboxNamespace`] plays the part of a class loader: for each class it is asked for, it
//! either delegates to the [`HostEnvironment`] or reads the original class file from its
//! [`ClassSource`]s, rewrites it if the configuration says so, and defines the result.

mod errors;
mod host;
mod namespace;
mod source;

pub use errors::*;
pub use host::*;
pub use namespace::*;
pub use source::*;
