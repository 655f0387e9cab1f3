use crate::jvm::class_file::{Attribute, Deserialize, Serialize, Utf8ConstantIndex};
use crate::jvm::MethodAccessFlags;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug, Clone)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Method {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Method {
            access_flags: MethodAccessFlags::deserialize(reader)?,
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}
