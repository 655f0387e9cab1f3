use super::class_file::{Deserialize, Serialize};
use bitflags::bitflags;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Result;

bitflags! {
    /// Access flags on classes
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.1-200-E.1
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

bitflags! {
    /// Access flags on methods
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6-200-A.1
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    /// Access flags on fields
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5-200-A.1
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

impl MethodAccessFlags {
    /// Replace any visibility with `public`
    pub fn made_public(self) -> MethodAccessFlags {
        let other_visibility = MethodAccessFlags::PRIVATE | MethodAccessFlags::PROTECTED;
        (self | MethodAccessFlags::PUBLIC) - other_visibility
    }

    /// Replace any visibility with `private`
    pub fn made_private(self) -> MethodAccessFlags {
        let other_visibility = MethodAccessFlags::PUBLIC | MethodAccessFlags::PROTECTED;
        (self | MethodAccessFlags::PRIVATE) - other_visibility
    }
}

impl ClassAccessFlags {
    /// Replace any visibility with `public`
    pub fn made_public(self) -> ClassAccessFlags {
        let other_visibility = ClassAccessFlags::PRIVATE | ClassAccessFlags::PROTECTED;
        (self | ClassAccessFlags::PUBLIC) - other_visibility
    }
}

impl Serialize for ClassAccessFlags {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.bits().serialize(writer)
    }
}

impl Serialize for MethodAccessFlags {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.bits().serialize(writer)
    }
}

impl Serialize for FieldAccessFlags {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.bits().serialize(writer)
    }
}

/// Unknown bits are kept rather than rejected, since newer class files may define extra flags
impl Deserialize for ClassAccessFlags {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        Ok(ClassAccessFlags::from_bits_truncate(u16::deserialize(reader)?))
    }
}

impl Deserialize for MethodAccessFlags {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        Ok(MethodAccessFlags::from_bits_truncate(u16::deserialize(reader)?))
    }
}

impl Deserialize for FieldAccessFlags {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        Ok(FieldAccessFlags::from_bits_truncate(u16::deserialize(reader)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn visibility_changes() {
        let flags = MethodAccessFlags::PROTECTED | MethodAccessFlags::FINAL;
        assert_eq!(
            flags.made_public(),
            MethodAccessFlags::PUBLIC | MethodAccessFlags::FINAL
        );
        assert_eq!(
            MethodAccessFlags::PUBLIC.made_private(),
            MethodAccessFlags::PRIVATE
        );
        assert_eq!(
            (ClassAccessFlags::PRIVATE | ClassAccessFlags::SUPER).made_public(),
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER
        );
    }
}
