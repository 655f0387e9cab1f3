use crate::jvm::class_file::{
    read_bytes, ClassConstantIndex, ConstantIndex, Deserialize, Serialize, Utf8ConstantIndex,
};
use crate::jvm::verifier::VerificationType;
use crate::jvm::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// The representation is designed to be easily extended with custom attributes.
/// Attributes that the rewriter doesn't understand are carried through untouched: since the
/// constant pool is only ever appended to, any constant indices they contain remain valid.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Attribute {
    /// Decode the attribute payload as a specific attribute
    ///
    /// The payload must be consumed exactly.
    pub fn decode<A: AttributeLike + Deserialize>(&self) -> Result<A, Error> {
        let mut cursor = Cursor::new(&self.info);
        let attribute = A::deserialize(&mut cursor).map_err(|_| Error::MalformedAttribute(A::NAME))?;
        if cursor.position() as usize != self.info.len() {
            return Err(Error::MalformedAttribute(A::NAME));
        }
        Ok(attribute)
    }
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

impl Deserialize for Attribute {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let name_index = Utf8ConstantIndex::deserialize(reader)?;
        let len = u32::deserialize(reader)?;
        let info = read_bytes(reader, len as usize)?;
        Ok(Attribute { name_index, info })
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally
/// they represent very different things. This trait is implemented by things
/// which can be turned into attributes.
pub trait AttributeLike: Serialize {
    /// Name of the attribute
    const NAME: &'static str;
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: BytecodeArray,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Code {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        self.code_array.serialize(writer)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Code {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Code {
            max_stack: u16::deserialize(reader)?,
            max_locals: u16::deserialize(reader)?,
            code_array: BytecodeArray::deserialize(reader)?,
            exception_table: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: BytecodeIndex,

    /// End of exception handler range (exclusive)
    pub end_pc: BytecodeIndex,

    /// Start of the exception handler
    pub handler_pc: BytecodeIndex,

    /// Class of exceptions caught (`None` catches everything, as for `finally`)
    pub catch_type: Option<ClassConstantIndex>,
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        match self.catch_type {
            Some(catch_type) => catch_type.serialize(writer)?,
            None => 0u16.serialize(writer)?,
        }
        Ok(())
    }
}

impl Deserialize for ExceptionHandler {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let start_pc = BytecodeIndex::deserialize(reader)?;
        let end_pc = BytecodeIndex::deserialize(reader)?;
        let handler_pc = BytecodeIndex::deserialize(reader)?;
        let catch_type = match u16::deserialize(reader)? {
            0 => None,
            idx => Some(ClassConstantIndex(ConstantIndex(idx))),
        };
        Ok(ExceptionHandler {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        })
    }
}

/// Encoded bytecode instructions
#[derive(Debug)]
pub struct BytecodeArray(pub Vec<u8>);

impl Serialize for BytecodeArray {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let len = self.0.len() as u32;
        len.serialize(writer)?;
        writer.write_all(&self.0)?;
        Ok(())
    }
}

impl Deserialize for BytecodeArray {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let len = u32::deserialize(reader)?;
        Ok(BytecodeArray(read_bytes(reader, len as usize)?))
    }
}

/// Index into `BytecodeArray`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BytecodeIndex(pub u16);

impl Serialize for BytecodeIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for BytecodeIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(BytecodeIndex(u16::deserialize(reader)?))
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.7.4
#[derive(Debug)]
pub struct StackMapTable(pub Vec<StackMapFrame>);

impl AttributeLike for StackMapTable {
    const NAME: &'static str = "StackMapTable";
}

impl Serialize for StackMapTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for StackMapTable {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(StackMapTable(Vec::deserialize(reader)?))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StackMapFrame {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    SameLocalsNoStack { offset_delta: u16 },

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack {
        offset_delta: u16,
        stack: VerificationType<ClassConstantIndex, u16>,
    },

    /// Frame is like the previous frame, but without the last `chopped_k` locals
    ///
    /// Note: `chopped_k` must be in the range 1 to 3 inclusive
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with extra locals
    /// Tags: 252-254
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<VerificationType<ClassConstantIndex, u16>>,
    },

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType<ClassConstantIndex, u16>>,
        stack: Vec<VerificationType<ClassConstantIndex, u16>>,
    },
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8).serialize(writer)?;
                } else {
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8 + 64).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                debug_assert!(
                    0 < *chopped_k && *chopped_k < 4,
                    "ChopLocalsNoStack chops 1-3 locals"
                );
                (251 - chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                let added_k = locals.len();
                debug_assert!(
                    0 < added_k && added_k < 4,
                    "AppendLocalsNoStack adds 1-3 locals"
                );
                (251 + added_k as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for StackMapFrame {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let tag = u8::deserialize(reader)?;
        Ok(match tag {
            0..=63 => StackMapFrame::SameLocalsNoStack {
                offset_delta: tag as u16,
            },
            64..=127 => StackMapFrame::SameLocalsOneStack {
                offset_delta: (tag - 64) as u16,
                stack: VerificationType::deserialize(reader)?,
            },
            247 => StackMapFrame::SameLocalsOneStack {
                offset_delta: u16::deserialize(reader)?,
                stack: VerificationType::deserialize(reader)?,
            },
            248..=250 => StackMapFrame::ChopLocalsNoStack {
                offset_delta: u16::deserialize(reader)?,
                chopped_k: 251 - tag,
            },
            251 => StackMapFrame::SameLocalsNoStack {
                offset_delta: u16::deserialize(reader)?,
            },
            252..=254 => {
                let offset_delta = u16::deserialize(reader)?;
                let mut locals = Vec::with_capacity((tag - 251) as usize);
                for _ in 251..tag {
                    locals.push(VerificationType::deserialize(reader)?);
                }
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals,
                }
            }
            255 => StackMapFrame::Full {
                offset_delta: u16::deserialize(reader)?,
                locals: Vec::deserialize(reader)?,
                stack: Vec::deserialize(reader)?,
            },
            other => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("reserved stack map frame tag {}", other),
                ))
            }
        })
    }
}

/// Checked exceptions a method declares
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.5
#[derive(Debug)]
pub struct Exceptions(pub Vec<ClassConstantIndex>);

impl AttributeLike for Exceptions {
    const NAME: &'static str = "Exceptions";
}

impl Serialize for Exceptions {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for Exceptions {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Exceptions(Vec::deserialize(reader)?))
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.12
#[derive(Debug)]
pub struct LineNumberTable(pub Vec<LineNumber>);

#[derive(Debug, Clone, Copy)]
pub struct LineNumber {
    pub start_pc: BytecodeIndex,
    pub line_number: u16,
}

impl AttributeLike for LineNumberTable {
    const NAME: &'static str = "LineNumberTable";
}

impl Serialize for LineNumberTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for LineNumberTable {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(LineNumberTable(Vec::deserialize(reader)?))
    }
}

impl Serialize for LineNumber {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.line_number.serialize(writer)
    }
}

impl Deserialize for LineNumber {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(LineNumber {
            start_pc: BytecodeIndex::deserialize(reader)?,
            line_number: u16::deserialize(reader)?,
        })
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.13
#[derive(Debug)]
pub struct LocalVariableTable(pub Vec<LocalVariable>);

#[derive(Debug, Clone, Copy)]
pub struct LocalVariable {
    pub start_pc: BytecodeIndex,
    pub length: u16,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub index: u16,
}

impl AttributeLike for LocalVariableTable {
    const NAME: &'static str = "LocalVariableTable";
}

impl Serialize for LocalVariableTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for LocalVariableTable {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(LocalVariableTable(Vec::deserialize(reader)?))
    }
}

impl Serialize for LocalVariable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.length.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.index.serialize(writer)
    }
}

impl Deserialize for LocalVariable {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(LocalVariable {
            start_pc: BytecodeIndex::deserialize(reader)?,
            length: u16::deserialize(reader)?,
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            index: u16::deserialize(reader)?,
        })
    }
}

/// Annotations retained in the class file and visible through reflection
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.16
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeVisibleAnnotations(pub Vec<Annotation>);

/// Annotations retained in the class file but not visible through reflection
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeInvisibleAnnotations(pub Vec<Annotation>);

impl AttributeLike for RuntimeVisibleAnnotations {
    const NAME: &'static str = "RuntimeVisibleAnnotations";
}

impl AttributeLike for RuntimeInvisibleAnnotations {
    const NAME: &'static str = "RuntimeInvisibleAnnotations";
}

impl Serialize for RuntimeVisibleAnnotations {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for RuntimeVisibleAnnotations {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(RuntimeVisibleAnnotations(Vec::deserialize(reader)?))
    }
}

impl Serialize for RuntimeInvisibleAnnotations {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for RuntimeInvisibleAnnotations {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(RuntimeInvisibleAnnotations(Vec::deserialize(reader)?))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Field descriptor of the annotation interface (eg. `Ljava/lang/Deprecated;`)
    pub type_index: Utf8ConstantIndex,
    pub elements: Vec<(Utf8ConstantIndex, ElementValue)>,
}

impl Serialize for Annotation {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.type_index.serialize(writer)?;
        (self.elements.len() as u16).serialize(writer)?;
        for (name, value) in &self.elements {
            name.serialize(writer)?;
            value.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for Annotation {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let type_index = Utf8ConstantIndex::deserialize(reader)?;
        let count = u16::deserialize(reader)?;
        let mut elements = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = Utf8ConstantIndex::deserialize(reader)?;
            elements.push((name, ElementValue::deserialize(reader)?));
        }
        Ok(Annotation {
            type_index,
            elements,
        })
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.16.1
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// Primitive or string constant (the tag is one of `BCDFIJSZs`)
    Const { tag: u8, value: ConstantIndex },
    Enum {
        type_name: Utf8ConstantIndex,
        const_name: Utf8ConstantIndex,
    },
    Class(Utf8ConstantIndex),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

impl Serialize for ElementValue {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            ElementValue::Const { tag, value } => {
                tag.serialize(writer)?;
                value.serialize(writer)?;
            }
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                b'e'.serialize(writer)?;
                type_name.serialize(writer)?;
                const_name.serialize(writer)?;
            }
            ElementValue::Class(class) => {
                b'c'.serialize(writer)?;
                class.serialize(writer)?;
            }
            ElementValue::Annotation(annotation) => {
                b'@'.serialize(writer)?;
                annotation.serialize(writer)?;
            }
            ElementValue::Array(values) => {
                b'['.serialize(writer)?;
                values.serialize(writer)?;
            }
        }
        Ok(())
    }
}

impl Deserialize for ElementValue {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(match u8::deserialize(reader)? {
            tag @ (b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's') => {
                ElementValue::Const {
                    tag,
                    value: ConstantIndex::deserialize(reader)?,
                }
            }
            b'e' => ElementValue::Enum {
                type_name: Utf8ConstantIndex::deserialize(reader)?,
                const_name: Utf8ConstantIndex::deserialize(reader)?,
            },
            b'c' => ElementValue::Class(Utf8ConstantIndex::deserialize(reader)?),
            b'@' => ElementValue::Annotation(Box::new(Annotation::deserialize(reader)?)),
            b'[' => ElementValue::Array(Vec::deserialize(reader)?),
            other => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unknown element value tag {}", other),
                ))
            }
        })
    }
}
