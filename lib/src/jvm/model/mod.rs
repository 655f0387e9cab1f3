//! Editable representation of a class
//!
//! This is the representation to use while rewriting classes. A [`ClassNode`] is parsed from the
//! bytes of a class file, gets modified, then gets written back out into bytes:
//!
//!   - __Class__ is represented using [`ClassNode`]
//!   - __Method__ is represented using [`MethodNode`], with the code in a [`MethodBody`]
//!   - __Field__ is represented using [`FieldNode`]
//!
//! Names and descriptors are stored by value, but attributes that the rewriter doesn't need to
//! understand (generic signatures, inner classes, bootstrap methods, etc.) are kept as raw
//! attributes pointing into the constant pool of the original class. Since the pool of a
//! [`ClassNode`] is seeded with the original constants and only ever appended to, those attributes
//! stay valid.
//!
//! [`MethodBody`]: crate::jvm::code::MethodBody

mod annotation;
mod class;
mod field;
mod method;

pub use annotation::*;
pub use class::*;
pub use field::*;
pub use method::*;
