use crate::jvm::class_file::{
    Attribute, ClassConstantIndex, Constant, ConstantIndex, Deserialize, Field, Method, Serialize,
    Version,
};
use crate::jvm::{ClassAccessFlags, Error};
use crate::util::OffsetVec;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug)]
pub struct ClassFile {
    pub version: Version,
    pub constants: OffsetVec<Constant>,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Only `java/lang/Object` has no super class
    pub super_class: Option<ClassConstantIndex>,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a class file
    ///
    /// This only checks the structure of the file. Constant pool indices are checked once they
    /// are looked up.
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = Cursor::new(bytes);
        let class_file = ClassFile::read(&mut reader)?;
        let trailing = bytes.len() - reader.position() as usize;
        if trailing != 0 {
            return Err(Error::TrailingBytes(trailing));
        }
        Ok(class_file)
    }

    fn read<R: ReadBytesExt>(reader: &mut R) -> Result<ClassFile, Error> {
        let magic = u32::deserialize(reader)?;
        if magic.to_be_bytes() != ClassFile::MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let version = Version::deserialize(reader)?;
        let constants = Constant::read_pool(reader)?;
        let access_flags = ClassAccessFlags::deserialize(reader)?;
        let this_class = ClassConstantIndex::deserialize(reader)?;
        let super_class = match u16::deserialize(reader)? {
            0 => None,
            idx => Some(ClassConstantIndex(ConstantIndex(idx))),
        };
        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces: Vec::deserialize(reader)?,
            fields: Vec::deserialize(reader)?,
            methods: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }

    /// Serialize the class file into a fresh buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        match self.super_class {
            Some(super_class) => super_class.serialize(writer)?,
            None => 0u16.serialize(writer)?,
        }
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}
