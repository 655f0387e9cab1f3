use crate::jvm::class_file::{
    ClassConstantIndex, ConstantPoolOverflow, ConstantsPool, ConstantsWriter, Deserialize,
    Serialize,
};
use crate::jvm::{BaseType, BinaryName, FieldType, RefType};
use crate::util::Width;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;

/// These types are from [this hierarchy][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    /// Unusable slot: unset locals, the second half of `long`/`double`, or locals whose types
    /// disagree where control flow meets
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(Cls),

    /// State of an object after `new` has been called but `<init>` has not been called
    ///
    ///   - while computing frames, we use [`UninitializedRef`] for `U`, tracking the type of the
    ///     object and which element of the method body holds the `new` instruction
    ///   - when serializing into a classfile, we use `u16` for `U`, corresponding to the offset of
    ///     the `new` instruction from the start of the method body
    Uninitialized(U),
}

/// Uninitialized object produced by a `new` instruction
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct UninitializedRef {
    /// Type the object will have once initialized
    pub class: BinaryName,

    /// Index of the `new` in the elements of the method body
    pub element: usize,
}

/// Verification type used while computing frames
pub type VType = VerificationType<RefType<BinaryName>, UninitializedRef>;

impl<Cls, U> VerificationType<Cls, U> {
    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        match self {
            VerificationType::Top
            | VerificationType::Integer
            | VerificationType::Float
            | VerificationType::Double
            | VerificationType::Long => false,

            VerificationType::Null
            | VerificationType::UninitializedThis
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_) => true,
        }
    }

    pub fn map<C2, U2>(
        &self,
        map_class: impl Fn(&Cls) -> C2,
        map_uninitialized: impl Fn(&U) -> U2,
    ) -> VerificationType<C2, U2> {
        match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(cls) => VerificationType::Object(map_class(cls)),
            VerificationType::Uninitialized(uninit) => {
                VerificationType::Uninitialized(map_uninitialized(uninit))
            }
        }
    }
}

impl<C, U> From<FieldType<C>> for VerificationType<RefType<C>, U> {
    fn from(field_type: FieldType<C>) -> Self {
        match field_type {
            FieldType::Base(BaseType::Int)
            | FieldType::Base(BaseType::Char)
            | FieldType::Base(BaseType::Short)
            | FieldType::Base(BaseType::Byte)
            | FieldType::Base(BaseType::Boolean) => VerificationType::Integer,
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type),
        }
    }
}

impl Serialize for VerificationType<ClassConstantIndex, u16> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            VerificationType::Top => 0u8.serialize(writer)?,
            VerificationType::Integer => 1u8.serialize(writer)?,
            VerificationType::Float => 2u8.serialize(writer)?,
            VerificationType::Double => 3u8.serialize(writer)?,
            VerificationType::Long => 4u8.serialize(writer)?,
            VerificationType::Null => 5u8.serialize(writer)?,
            VerificationType::UninitializedThis => 6u8.serialize(writer)?,
            VerificationType::Object(cls) => {
                7u8.serialize(writer)?;
                cls.serialize(writer)?;
            }
            VerificationType::Uninitialized(off) => {
                8u8.serialize(writer)?;
                off.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for VerificationType<ClassConstantIndex, u16> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(match u8::deserialize(reader)? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(ClassConstantIndex::deserialize(reader)?),
            8 => VerificationType::Uninitialized(u16::deserialize(reader)?),
            other => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unknown verification type tag {}", other),
                ))
            }
        })
    }
}

impl<Cls, A> Width for VerificationType<Cls, A> {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}

impl VType {
    /// Resolve the type into its serializable form
    ///
    /// `new_offsets` maps the element index of every `new` instruction to its bytecode offset.
    pub fn into_serializable(
        &self,
        constants_pool: &mut ConstantsPool,
        new_offsets: &HashMap<usize, u16>,
    ) -> Result<VerificationType<ClassConstantIndex, u16>, ConstantPoolOverflow> {
        Ok(match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(ref_type) => {
                VerificationType::Object(ref_type.constant_index(constants_pool)?)
            }
            VerificationType::Uninitialized(uninitialized) => VerificationType::Uninitialized(
                new_offsets
                    .get(&uninitialized.element)
                    .copied()
                    .unwrap_or_default(),
            ),
        })
    }
}
