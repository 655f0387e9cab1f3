//! Read, rewrite, and write JVM classes
//!
//! Classes are parsed into a [`model::ClassNode`], where method bodies are symbolic
//! ([`code::MethodBody`]): jumps go to labels and constants are stored by value. After the class
//! is modified, writing it back out lays out the bytecode again and recomputes stack map frames
//! (see [`verifier`]), which needs some knowledge of the class hierarchy (see [`hierarchy`]).
//!
//! ### Simple example
//!
//! Adding a static method which returns `42` to an existing class:
//!
//! ```
//! use shadowbox::jvm::code::{Insn, MethodBody};
//! use shadowbox::jvm::hierarchy::NoClasses;
//! use shadowbox::jvm::model::{ClassNode, MethodNode};
//! use shadowbox::jvm::*;
//!
//! # fn add_method(class_bytes: &[u8]) -> Result<Vec<u8>, Error> {
//! let mut class = ClassNode::parse(class_bytes)?;
//!
//! let mut method = MethodNode::new(
//!     MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
//!     UnqualifiedName::from_string(String::from("answer")).map_err(Error::BadName)?,
//!     MethodDescriptor {
//!         parameters: vec![],
//!         return_type: Some(FieldType::int()),
//!     },
//! );
//! let mut body = MethodBody::new();
//! body.push(Insn::push_int(42));
//! body.push_return(Some(&FieldType::int()));
//! method.body = Some(body);
//! class.methods.push(method);
//!
//! class.write(&NoClasses)
//! # }
//! ```

mod access_flags;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
pub mod hierarchy;
pub mod model;
mod names;
pub mod verifier;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
