use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Result;

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

/// Counterpart of [`Serialize`], with the same conventions for tags and sequence lengths
pub trait Deserialize: Sized {
    /// Read construct from a binary input stream
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self>;
}

macro_rules! big_endian_primitive {
    ($typ:ty, $write:ident, $read:ident) => {
        impl Serialize for $typ {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                writer.$write::<BigEndian>(*self)
            }
        }

        impl Deserialize for $typ {
            fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
                reader.$read::<BigEndian>()
            }
        }
    };
}

big_endian_primitive!(u16, write_u16, read_u16);
big_endian_primitive!(u32, write_u32, read_u32);
big_endian_primitive!(u64, write_u64, read_u64);
big_endian_primitive!(i16, write_i16, read_i16);
big_endian_primitive!(i32, write_i32, read_i32);
big_endian_primitive!(i64, write_i64, read_i64);
big_endian_primitive!(f32, write_f32, read_f32);
big_endian_primitive!(f64, write_f64, read_f64);

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Deserialize for u8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_u8()
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

impl Deserialize for i8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_i8()
    }
}

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let len = u16::deserialize(reader)?;
        let mut elems = Vec::with_capacity(len as usize);
        for _ in 0..len {
            elems.push(A::deserialize(reader)?);
        }
        Ok(elems)
    }
}

/// Read exactly `len` raw bytes
pub fn read_bytes<R: ReadBytesExt>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0; len];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn big_endian_sequences() {
        let mut bytes = vec![];
        vec![0x0102u16, 0x0304].serialize(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0, 2, 1, 2, 3, 4]);

        let read: Vec<u16> = Vec::deserialize(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(read, vec![0x0102, 0x0304]);
    }

    #[test]
    fn truncated_input() {
        let bytes = [0u8, 3, 0, 1];
        assert!(Vec::<u16>::deserialize(&mut Cursor::new(&bytes[..])).is_err());
    }
}
