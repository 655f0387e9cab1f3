//! Bytecode representation and rewriting
//!
//! ### Structure
//!
//! Despite being pushed off into [just another method attribute](crate::jvm::class_file::Code),
//! the bytecode is arguably the most important part of the class file: it contains the actual
//! executable instructions. We split up the [list of bytecode instructions][0] into two groups:
//!
//!   - [`Instruction`] for straight-line instructions
//!   - [`BranchInstruction`] for instructions that may jump, return, or throw
//!
//! A [`MethodBody`] is a flat sequence of these, interleaved with [`SynLabel`]s marking jump
//! targets. Operands are symbolic (classes, methods, and constants by value), so instrumentation
//! can splice code into a body without caring about offsets or the constant pool.
//!
//! ### Round trip
//!
//! [`decode_body`] turns a `Code` attribute into a [`MethodBody`], and [`encode_body`] turns it
//! back, recomputing offsets, the stack map table (see [`crate::jvm::verifier`]), and the maximum
//! stack and locals.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod body;
mod branch;
mod decode;
mod encode;
mod instructions;
mod label;

pub use body::*;
pub use branch::*;
pub use decode::*;
pub use encode::*;
pub use instructions::*;
pub use label::*;
