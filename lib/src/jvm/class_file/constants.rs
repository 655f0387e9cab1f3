use crate::jvm::class_file::{Attribute, AttributeLike, Deserialize, Serialize};
use crate::jvm::RenderDescriptor;
use crate::jvm::names::{BinaryName, Name};
use crate::jvm::{Error, RefType};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;
use std::result::Result;
use thiserror::Error as ThisError;

/// Class file constants pool builder
///
/// The pool is append only and only after the pool is fully built up, it can be consumed into a
/// regular [`OffsetVec`]. A pool can be seeded from the constants of an existing class file, in
/// which case every index of the original pool stays valid and new constants are appended (or
/// deduplicated against the existing ones). The [`ConstantsWriter`] trait exposes inserting types
/// into the constants pool.
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,

    classes: HashMap<String, ClassConstantIndex>,
    fieldrefs: HashMap<(ClassConstantIndex, NameAndTypeConstantIndex), FieldRefConstantIndex>,
    methodrefs:
        HashMap<(ClassConstantIndex, NameAndTypeConstantIndex, bool), MethodRefConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, StringConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    floats: HashMap<u32, ConstantIndex>,
    longs: HashMap<i64, ConstantIndex>,
    doubles: HashMap<u64, ConstantIndex>,
    name_and_types: HashMap<(Utf8ConstantIndex, Utf8ConstantIndex), NameAndTypeConstantIndex>,
    utf8s: HashMap<String, Utf8ConstantIndex>,
    method_types: HashMap<Utf8ConstantIndex, ConstantIndex>,
    invoke_dynamics: HashMap<(u16, NameAndTypeConstantIndex), ConstantIndex>,
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            classes: HashMap::new(),
            fieldrefs: HashMap::new(),
            methodrefs: HashMap::new(),
            strings: HashMap::new(),
            integers: HashMap::new(),
            floats: HashMap::new(),
            longs: HashMap::new(),
            doubles: HashMap::new(),
            name_and_types: HashMap::new(),
            utf8s: HashMap::new(),
            method_types: HashMap::new(),
            invoke_dynamics: HashMap::new(),
        }
    }

    /// Seed a pool from the constants of an existing class file
    ///
    /// The first occurrence of a duplicated constant is the one that later lookups return.
    pub fn from_constants(constants: OffsetVec<Constant>) -> ConstantsPool {
        let mut pool = ConstantsPool::new();
        for (offset, _, constant) in constants.iter() {
            let index = ConstantIndex(offset.0 as u16);
            match constant {
                Constant::Utf8(string) => {
                    pool.utf8s
                        .entry(string.clone())
                        .or_insert(Utf8ConstantIndex(index));
                }
                Constant::Integer(integer) => {
                    pool.integers.entry(*integer).or_insert(index);
                }
                Constant::Float(float) => {
                    pool.floats.entry(float.to_bits()).or_insert(index);
                }
                Constant::Long(long) => {
                    pool.longs.entry(*long).or_insert(index);
                }
                Constant::Double(double) => {
                    pool.doubles.entry(double.to_bits()).or_insert(index);
                }
                Constant::String(utf8) => {
                    pool.strings
                        .entry(*utf8)
                        .or_insert(StringConstantIndex(index));
                }
                Constant::NameAndType { name, descriptor } => {
                    pool.name_and_types
                        .entry((*name, *descriptor))
                        .or_insert(NameAndTypeConstantIndex(index));
                }
                Constant::FieldRef(class, name_and_type) => {
                    pool.fieldrefs
                        .entry((*class, *name_and_type))
                        .or_insert(FieldRefConstantIndex(index));
                }
                Constant::MethodRef {
                    class,
                    name_and_type,
                    is_interface,
                } => {
                    pool.methodrefs
                        .entry((*class, *name_and_type, *is_interface))
                        .or_insert(MethodRefConstantIndex(index));
                }
                Constant::MethodType { descriptor } => {
                    pool.method_types.entry(*descriptor).or_insert(index);
                }
                Constant::InvokeDynamic {
                    bootstrap_method,
                    method_descriptor,
                } => {
                    pool.invoke_dynamics
                        .entry((*bootstrap_method, *method_descriptor))
                        .or_insert(index);
                }
                _ => (),
            }
        }

        // Class names can only be resolved once all of the UTF-8 entries are known
        for (offset, _, constant) in constants.iter() {
            if let Constant::Class(name) = constant {
                if let Some(Constant::Utf8(name)) = constants.get_offset(Offset(name.0 .0 as usize)) {
                    pool.classes
                        .entry(name.clone())
                        .or_insert(ClassConstantIndex(ConstantIndex(offset.0 as u16)));
                }
            }
        }

        pool.constants = constants;
        pool
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        // Compute the offset at which this constant will be inserted
        let offset = self.constants.offset_len().0;

        // Detect if the next constant would overflow the pool
        if offset + constant.width() > u16::MAX as usize {
            return Err(ConstantPoolOverflow { constant, offset });
        }

        self.constants.push(constant);
        Ok(ConstantIndex(offset as u16))
    }

    /// Consume the pool and return the final vector of constants
    pub fn into_offset_vec(self) -> OffsetVec<Constant> {
        self.constants
    }

    /// Look up the constant at an index
    pub fn get(&self, index: impl Into<ConstantIndex>) -> Result<&Constant, Error> {
        let index: ConstantIndex = index.into();
        self.constants
            .get_offset(Offset(index.0 as usize))
            .ok_or(Error::MissingConstant(index.0))
    }

    /// Look up a UTF-8 constant
    pub fn utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.get(index)? {
            Constant::Utf8(string) => Ok(string),
            _ => Err(Error::BadConstant {
                index: index.0 .0,
                expected: "UTF-8 string",
            }),
        }
    }

    /// Look up the name stored in a class constant
    ///
    /// For array classes, this is a descriptor (see [`RefType::from_class_constant`]).
    pub fn class_name(&self, index: ClassConstantIndex) -> Result<&str, Error> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            _ => Err(Error::BadConstant {
                index: index.0 .0,
                expected: "class",
            }),
        }
    }

    /// Look up a class constant which must name a class (not an array)
    pub fn binary_name(&self, index: ClassConstantIndex) -> Result<BinaryName, Error> {
        let name = self.class_name(index)?;
        BinaryName::from_string(String::from(name)).map_err(Error::BadName)
    }

    /// Look up a class constant as a reference type
    pub fn ref_type(&self, index: ClassConstantIndex) -> Result<RefType<BinaryName>, Error> {
        let name = self.class_name(index)?;
        RefType::from_class_constant(name)
    }

    /// Look up the name and descriptor in a name-and-type constant
    pub fn name_and_type(&self, index: NameAndTypeConstantIndex) -> Result<(&str, &str), Error> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(Error::BadConstant {
                index: index.0 .0,
                expected: "name and type",
            }),
        }
    }

    /// Look up a field reference as `(class, name, descriptor)`
    pub fn field_ref(&self, index: FieldRefConstantIndex) -> Result<(&str, &str, &str), Error> {
        match self.get(index)? {
            Constant::FieldRef(class, name_and_type) => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok((self.class_name(*class)?, name, descriptor))
            }
            _ => Err(Error::BadConstant {
                index: index.0 .0,
                expected: "field reference",
            }),
        }
    }

    /// Look up a method reference as `(class, name, descriptor, is_interface)`
    pub fn method_ref(
        &self,
        index: MethodRefConstantIndex,
    ) -> Result<(&str, &str, &str, bool), Error> {
        match self.get(index)? {
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok((self.class_name(*class)?, name, descriptor, *is_interface))
            }
            _ => Err(Error::BadConstant {
                index: index.0 .0,
                expected: "method reference",
            }),
        }
    }

    /// Look up an `invokedynamic` call site as `(bootstrap method, name, descriptor)`
    pub fn invoke_dynamic(&self, index: ConstantIndex) -> Result<(u16, &str, &str), Error> {
        match self.get(index)? {
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                let (name, descriptor) = self.name_and_type(*method_descriptor)?;
                Ok((*bootstrap_method, name, descriptor))
            }
            _ => Err(Error::BadConstant {
                index: index.0,
                expected: "invokedynamic call site",
            }),
        }
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8<'a, S: Into<Cow<'a, str>>>(
        &mut self,
        utf8: S,
    ) -> Result<Utf8ConstantIndex, ConstantPoolOverflow> {
        let cow = utf8.into();

        if let Some(idx) = self.utf8s.get::<str>(cow.borrow()) {
            Ok(*idx)
        } else {
            let owned = cow.into_owned();
            let constant = Constant::Utf8(owned.clone());
            let idx = Utf8ConstantIndex(self.push_constant(constant)?);
            self.utf8s.insert(owned, idx);
            Ok(idx)
        }
    }

    /// Get or insert a string constant from the constant pool
    pub fn get_string(
        &mut self,
        utf8: Utf8ConstantIndex,
    ) -> Result<StringConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.strings.get(&utf8) {
            Ok(*idx)
        } else {
            let constant = Constant::String(utf8);
            let idx = StringConstantIndex(self.push_constant(constant)?);
            self.strings.insert(utf8, idx);
            Ok(idx)
        }
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(
        &mut self,
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    ) -> Result<NameAndTypeConstantIndex, ConstantPoolOverflow> {
        let name_and_type_key = (name, descriptor);
        if let Some(idx) = self.name_and_types.get(&name_and_type_key) {
            Ok(*idx)
        } else {
            let constant = Constant::NameAndType { name, descriptor };
            let idx = NameAndTypeConstantIndex(self.push_constant(constant)?);
            self.name_and_types.insert(name_and_type_key, idx);
            Ok(idx)
        }
    }

    /// Get or insert a class constant, given the name as it is stored in the constant
    pub fn get_class(&mut self, name: &str) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.classes.get(name) {
            Ok(*idx)
        } else {
            let utf8 = self.get_utf8(name)?;
            let idx = ClassConstantIndex(self.push_constant(Constant::Class(utf8))?);
            self.classes.insert(String::from(name), idx);
            Ok(idx)
        }
    }

    /// Get or insert a field reference constant
    pub fn get_field_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<FieldRefConstantIndex, ConstantPoolOverflow> {
        let class = self.get_class(class)?;
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        if let Some(idx) = self.fieldrefs.get(&(class, name_and_type)) {
            Ok(*idx)
        } else {
            let constant = Constant::FieldRef(class, name_and_type);
            let idx = FieldRefConstantIndex(self.push_constant(constant)?);
            self.fieldrefs.insert((class, name_and_type), idx);
            Ok(idx)
        }
    }

    /// Get or insert a method reference constant
    pub fn get_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<MethodRefConstantIndex, ConstantPoolOverflow> {
        let class = self.get_class(class)?;
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        let key = (class, name_and_type, is_interface);
        if let Some(idx) = self.methodrefs.get(&key) {
            Ok(*idx)
        } else {
            let constant = Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            };
            let idx = MethodRefConstantIndex(self.push_constant(constant)?);
            self.methodrefs.insert(key, idx);
            Ok(idx)
        }
    }

    pub fn get_integer(&mut self, integer: i32) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.integers.get(&integer) {
            Ok(*idx)
        } else {
            let idx = self.push_constant(Constant::Integer(integer))?;
            self.integers.insert(integer, idx);
            Ok(idx)
        }
    }

    pub fn get_float(&mut self, float: f32) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.floats.get(&float.to_bits()) {
            Ok(*idx)
        } else {
            let idx = self.push_constant(Constant::Float(float))?;
            self.floats.insert(float.to_bits(), idx);
            Ok(idx)
        }
    }

    pub fn get_long(&mut self, long: i64) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.longs.get(&long) {
            Ok(*idx)
        } else {
            let idx = self.push_constant(Constant::Long(long))?;
            self.longs.insert(long, idx);
            Ok(idx)
        }
    }

    pub fn get_double(&mut self, double: f64) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.doubles.get(&double.to_bits()) {
            Ok(*idx)
        } else {
            let idx = self.push_constant(Constant::Double(double))?;
            self.doubles.insert(double.to_bits(), idx);
            Ok(idx)
        }
    }

    /// Get or insert a method type constant
    pub fn get_method_type(
        &mut self,
        descriptor: &str,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let descriptor = self.get_utf8(descriptor)?;
        if let Some(idx) = self.method_types.get(&descriptor) {
            Ok(*idx)
        } else {
            let idx = self.push_constant(Constant::MethodType { descriptor })?;
            self.method_types.insert(descriptor, idx);
            Ok(idx)
        }
    }

    /// Get or insert an `invokedynamic` call site constant
    pub fn get_invoke_dynamic(
        &mut self,
        bootstrap_method: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        let method_descriptor = self.get_name_and_type(name, descriptor)?;
        let key = (bootstrap_method, method_descriptor);
        if let Some(idx) = self.invoke_dynamics.get(&key) {
            Ok(*idx)
        } else {
            let idx = self.push_constant(Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            })?;
            self.invoke_dynamics.insert(key, idx);
            Ok(idx)
        }
    }

    /// Add an attribute to the constant pool
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];

        attribute.serialize(&mut info)?;

        Ok(Attribute { name_index, info })
    }
}

impl Default for ConstantsPool {
    fn default() -> Self {
        ConstantsPool::new()
    }
}

#[derive(Debug, ThisError)]
#[error("constant pool overflow adding {constant:?} at offset {offset}")]
pub struct ConstantPoolOverflow {
    pub constant: Constant,
    pub offset: usize,
}

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// UTF-8 entry which cannot be represented as a Rust string (eg. unpaired surrogates)
    ///
    /// These are carried through byte for byte. They can still be the contents of a string
    /// constant, but never a name or descriptor.
    RawUtf8(Vec<u8>),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// Depending on the method kind, this points to different things:
        ///
        ///   - `FieldRef` for `GetField`, `GetStatic`, `PutField`, `PutStatic`
        ///   - `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },

    Module(Utf8ConstantIndex),
    Package(Utf8ConstantIndex),
}

impl Constant {
    /// Read one constant pool entry
    pub fn read<R: ReadBytesExt>(reader: &mut R) -> Result<Constant, Error> {
        let constant = match u8::deserialize(reader)? {
            1 => {
                let len = u16::deserialize(reader)?;
                let bytes = super::read_bytes(reader, len as usize)?;
                match decode_modified_utf8(&bytes) {
                    Some(string) => Constant::Utf8(string),
                    None => Constant::RawUtf8(bytes),
                }
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef(
                ClassConstantIndex::deserialize(reader)?,
                NameAndTypeConstantIndex::deserialize(reader)?,
            ),
            tag @ (10 | 11) => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::read(reader)?,
                member: ConstantIndex::deserialize(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                method_descriptor: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            19 => Constant::Module(Utf8ConstantIndex::deserialize(reader)?),
            20 => Constant::Package(Utf8ConstantIndex::deserialize(reader)?),
            other => return Err(Error::UnknownConstantTag(other)),
        };
        Ok(constant)
    }

    /// Read a full constant pool, including its leading count
    pub fn read_pool<R: ReadBytesExt>(reader: &mut R) -> Result<OffsetVec<Constant>, Error> {
        let count = u16::deserialize(reader)? as usize;
        let mut constants = OffsetVec::new_starting_at(Offset(1));
        while constants.offset_len().0 < count {
            constants.push(Constant::read(reader)?);
        }
        Ok(constants)
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::RawUtf8(buffer) => {
                1u8.serialize(writer)?;
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                method_descriptor.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// The count written is one more than the largest index (index 0 is never used)
impl Serialize for OffsetVec<Constant> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.offset_len().0 as u16).serialize(writer)?;
        for (_, _, constant) in self.iter() {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    for c in string.chars() {
        // Handle the exception for how `\u{0000}` is represented
        let len: usize = if c == '\u{0000}' { 2 } else { c.len_utf8() };
        let code: u32 = c as u32;

        match len {
            1 => buffer.push(code as u8),
            2 => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            3 => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }

            // Supplementary characters: main divergence from unicode
            _ => {
                buffer.push(0b1110_1101);
                buffer.push(((code >> 16 & 0x0F) as u8).wrapping_sub(1) & 0x0F | 0b1010_0000);
                buffer.push((code >> 10 & 0x3F) as u8 | 0b1000_0000);

                buffer.push(0b1110_1101);
                buffer.push(((code >> 6 & 0x0F) as u8) | 0b1011_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Returns `None` for byte sequences that are malformed or that decode to unpaired surrogates.
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    while let Some(b1) = iter.next() {
        let unit: u16 = match b1 {
            0x01..=0x7F => b1 as u16,
            0xC0..=0xDF => {
                let b2 = continuation(iter.next()?)?;
                ((b1 as u16 & 0x1F) << 6) | b2
            }
            0xE0..=0xEF => {
                let b2 = continuation(iter.next()?)?;
                let b3 = continuation(iter.next()?)?;
                ((b1 as u16 & 0x0F) << 12) | (b2 << 6) | b3
            }
            _ => return None,
        };
        units.push(unit);
    }
    String::from_utf16(&units).ok()
}

fn continuation(byte: u8) -> Option<u16> {
    if byte & 0b1100_0000 == 0b1000_0000 {
        Some((byte & 0x3F) as u16)
    } else {
        None
    }
}

#[cfg(test)]
mod encode_modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]).unwrap(), "a\x00a");
    }

    #[test]
    fn simple_ascii() {
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
        assert_eq!(
            encode_modified_utf8("hel10_World"),
            vec![104, 101, 108, 49, 48, 95, 87, 111, 114, 108, 100]
        );
    }

    #[test]
    fn two_and_three_byte_encodings() {
        let two_byte = "ĄǍǞǠǺȀȂȦȺӐӒ";
        assert_eq!(
            encode_modified_utf8(two_byte),
            vec![
                196, 132, 199, 141, 199, 158, 199, 160, 199, 186, 200, 128, 200, 130, 200, 166,
                200, 186, 211, 144, 211, 146
            ]
        );
        assert_eq!(decode_modified_utf8(&encode_modified_utf8(two_byte)).unwrap(), two_byte);

        let three_byte = "ऄअॲঅਅઅଅஅఅಅഅะະ༁ཨ";
        assert_eq!(
            decode_modified_utf8(&encode_modified_utf8(three_byte)).unwrap(),
            three_byte
        );
    }

    #[test]
    fn supplementary_characters() {
        let supplementary = "\u{10000}\u{dffff}\u{10FFFF}";
        assert_eq!(
            encode_modified_utf8(supplementary),
            vec![
                237, 160, 128, 237, 176, 128, 237, 172, 191, 237, 191, 191, 237, 175, 191, 237,
                191, 191
            ]
        );
        assert_eq!(
            decode_modified_utf8(&encode_modified_utf8(supplementary)).unwrap(),
            supplementary
        );
    }

    #[test]
    fn malformed_input() {
        // raw null byte, truncated sequence, and an unpaired high surrogate
        assert_eq!(decode_modified_utf8(&[0]), None);
        assert_eq!(decode_modified_utf8(&[0xE0, 0x80]), None);
        assert_eq!(decode_modified_utf8(&[237, 160, 128]), None);
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVM class file format:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
/// >
/// > In retrospect, making 8-byte constants take two constant pool entries was a poor choice.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct StringConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct FieldRefConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct MethodRefConstantIndex(pub ConstantIndex);

macro_rules! constant_index_newtype {
    ($($typ:ident),*) => {
        $(
            impl From<$typ> for ConstantIndex {
                fn from(index: $typ) -> ConstantIndex {
                    index.0
                }
            }

            impl Serialize for $typ {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            /// Only the index is read - its kind is checked when it is looked up in the pool
            impl Deserialize for $typ {
                fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
                    Ok($typ(ConstantIndex::deserialize(reader)?))
                }
            }
        )*
    };
}

constant_index_newtype!(
    Utf8ConstantIndex,
    StringConstantIndex,
    NameAndTypeConstantIndex,
    ClassConstantIndex,
    FieldRefConstantIndex,
    MethodRefConstantIndex
);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(ConstantIndex(u16::deserialize(reader)?))
    }
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    fn read<R: ReadBytesExt>(reader: &mut R) -> Result<HandleKind, Error> {
        Ok(match u8::deserialize(reader)? {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return Err(Error::UnknownConstantTag(15)),
        })
    }
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let byte: u8 = match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        };
        byte.serialize(writer)
    }
}

pub trait ConstantsWriter<Index = ConstantIndex> {
    /// Get or insert a constant into the constant pool and return the associated index
    fn constant_index(
        &self,
        constants_pool: &mut ConstantsPool,
    ) -> Result<Index, ConstantPoolOverflow>;
}

/// When making a `CONSTANT_Class_info`, reference types are almost always objects. However,
/// there are a handful of places where an array type needs to be fit in (eg. for a `checkcast`
/// to an array type). See [this section of the JVM documentation][0] for more.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4.1
impl ConstantsWriter<ClassConstantIndex> for RefType<BinaryName> {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        match self {
            RefType::Object(class) => constants.get_class(class.as_str()),
            other => constants.get_class(&other.render()),
        }
    }
}

/// Write a `CONSTANT_Class_info`
impl ConstantsWriter<ClassConstantIndex> for BinaryName {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        constants.get_class(self.as_str())
    }
}

#[cfg(test)]
mod pool_tests {
    use super::*;

    #[test]
    fn seeded_pool_keeps_indices_and_deduplicates() {
        let mut original = ConstantsPool::new();
        let object = BinaryName::OBJECT.constant_index(&mut original).unwrap();
        let long = original.get_long(7).unwrap();
        let after_long = original.get_integer(1).unwrap();
        assert_eq!(after_long.0, long.0 + 2);

        let mut pool = ConstantsPool::from_constants(original.into_offset_vec());
        assert_eq!(BinaryName::OBJECT.constant_index(&mut pool).unwrap(), object);
        assert_eq!(pool.get_long(7).unwrap(), long);
        assert_eq!(pool.class_name(object).unwrap(), "java/lang/Object");

        let string = BinaryName::STRING.constant_index(&mut pool).unwrap();
        assert!(ConstantIndex::from(string).0 > after_long.0);
    }

    #[test]
    fn pool_round_trip() {
        let mut pool = ConstantsPool::new();
        let method = pool
            .get_method_ref("java/lang/Object", "toString", "()Ljava/lang/String;", false)
            .unwrap();
        pool.get_double(1.5).unwrap();
        let mut bytes = vec![];
        pool.into_offset_vec().serialize(&mut bytes).unwrap();

        let constants = Constant::read_pool(&mut std::io::Cursor::new(&bytes)).unwrap();
        let pool = ConstantsPool::from_constants(constants);
        assert_eq!(
            pool.method_ref(method).unwrap(),
            ("java/lang/Object", "toString", "()Ljava/lang/String;", false)
        );
    }

    #[test]
    fn kinds_are_checked_on_lookup() {
        let mut pool = ConstantsPool::new();
        let utf8 = pool.get_utf8("hello").unwrap();
        let not_a_class = ClassConstantIndex(utf8.0);
        assert!(matches!(
            pool.class_name(not_a_class),
            Err(Error::BadConstant { .. })
        ));
        assert!(matches!(
            pool.get(ConstantIndex(40)),
            Err(Error::MissingConstant(40))
        ));
    }
}
