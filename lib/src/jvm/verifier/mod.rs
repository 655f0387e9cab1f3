//! Frame inference for rewritten method bodies
//!
//! For any instruction inside a method body, the stack and locals have the same structure
//! regardless of which control flow path reached the instruction. The types and order of the stack
//! and locals at that point make up the _stack map frame_ (represented using [`Frame`]) and the
//! frames at every jump target of a method make up the _stack map table_.
//!
//! Class files from version 50 onwards carry a [`crate::jvm::class_file::StackMapTable`] so that
//! the JVM can check each method in a single pass. Since instrumentation splices new code into
//! existing methods, the old table is thrown away and a fresh one is computed:
//!
//!   - [`Frame::verify_instruction`] and [`Frame::verify_branch_instruction`] compute how a
//!     single instruction transforms the frame
//!   - [`analyze`] propagates frames through the whole body until they stop changing, merging
//!     frames where control flow meets (this is where the class hierarchy gets consulted)
//!   - [`SerializableFrame::stack_map_frame`] picks the most compact encoding of each frame
//!
//! The verification types themselves ([`VerificationType`]) are slightly augmented field types:
//! they also track initialization and `null`.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod analysis;
mod frame;
mod types;

pub use analysis::*;
pub use frame::*;
pub use types::*;
