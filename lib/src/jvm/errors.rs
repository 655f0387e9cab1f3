use super::class_file::ConstantPoolOverflow;
use thiserror::Error;

/// Anything that can go wrong while reading, rewriting, or writing a class file
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    ConstantPoolOverflow(#[from] ConstantPoolOverflow),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("class file does not start with 0xCAFEBABE (found {0:#010x})")]
    BadMagic(u32),

    #[error("class file has {0} trailing bytes")]
    TrailingBytes(usize),

    /// Constant pool entry exists, but has the wrong kind
    #[error("constant #{index} is not a {expected}")]
    BadConstant { index: u16, expected: &'static str },

    /// Constant pool index does not refer to the start of an entry
    #[error("constant #{0} does not exist")]
    MissingConstant(u16),

    #[error("unknown constant pool tag {0}")]
    UnknownConstantTag(u8),

    #[error("invalid modified UTF-8 string")]
    BadUtf8,

    #[error("invalid descriptor '{0}'")]
    BadDescriptor(String),

    #[error("invalid name: {0}")]
    BadName(String),

    /// Class needed for computing a common super class is missing from the class lookup
    #[error("class {0} can't be found")]
    UnknownClass(String),

    #[error("malformed {0} attribute")]
    MalformedAttribute(&'static str),

    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    /// Instructions that can be read but not rewritten (eg. `jsr` and `ret`)
    #[error("unsupported instruction {0}")]
    UnsupportedInstruction(&'static str),

    #[error("jump to offset {0} is not on an instruction boundary")]
    BadJumpTarget(usize),

    #[error("max stack of {0} does not fit in a method")]
    MethodCodeMaxStackOverflow(usize),

    #[error("max locals of {0} does not fit in a method")]
    MethodCodeMaxLocalsOverflow(usize),

    #[error("code size of {0} does not fit in a method")]
    MethodCodeOverflow(usize),

    /// Error while computing frames
    #[error("cannot compute frame at instruction {index} ({instruction}): {kind}")]
    VerifierError {
        index: usize,
        instruction: String,
        kind: VerifierErrorKind,
    },

    /// Two control flow edges reach the same instruction with incompatible stacks
    #[error("incompatible stacks meet at instruction {0}")]
    IncompatibleFrames(usize),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifierErrorKind {
    #[error("pop from an empty stack")]
    EmptyStack,

    #[error("value of width {0} where another width was expected")]
    InvalidWidth(usize),

    #[error("local variable index out of range")]
    InvalidIndex,

    #[error("value has an invalid type")]
    InvalidType,

    #[error("invalid descriptor '{0}'")]
    BadDescriptor(String),

    #[error("control falls off the end of the method")]
    FallsOffEnd,
}
