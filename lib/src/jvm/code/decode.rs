//! Decoding of `Code` attributes into [`MethodBody`]
//!
//! Decoding happens in two passes: the first walks the bytecode array and produces instructions
//! whose jump targets are still absolute offsets, the second places labels at every offset that
//! is referenced (by a jump, the exception table, or the debug tables) and resolves the targets.

use crate::jvm::class_file::{
    ClassConstantIndex, Code, Constant, ConstantIndex, ConstantsPool, Deserialize,
    FieldRefConstantIndex, LineNumberTable, LocalVariableTable, MethodRefConstantIndex,
};
use crate::jvm::code::{
    BranchInstruction, CodeElement, CompareMode, EqComparison, FieldRef, Insn, Instruction,
    InvokeDynamicRef, InvokeType, LdcConstant, LocalVariableEntry, MethodBody,
    MethodRef, OrdComparison, ShiftType, SynLabel, SynLabelGenerator, TryCatch,
};
use crate::jvm::{
    BaseType, BinaryName, Error, FieldType, MethodDescriptor, Name, ParseDescriptor, RefType,
    UnqualifiedName,
};
use byteorder::ReadBytesExt;
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;

/// Instruction with absolute jump targets
enum Decoded {
    Insn(Insn),
    Branch(BranchInstruction<usize, usize>),
}

/// Decode the body of a method
pub fn decode_body(code: &Code, pool: &ConstantsPool) -> Result<MethodBody, Error> {
    let bytes = &code.code_array.0;
    let mut cursor = Cursor::new(bytes.as_slice());
    let mut decoded: Vec<(usize, Decoded)> = vec![];
    while (cursor.position() as usize) < bytes.len() {
        let offset = cursor.position() as usize;
        let insn = decode_instruction(&mut cursor, offset, pool)?;
        decoded.push((offset, insn));
    }

    let mut labels = LabelMap {
        boundaries: decoded.iter().map(|(offset, _)| *offset).collect(),
        labels: BTreeMap::new(),
        generator: SynLabelGenerator::default(),
    };
    labels.boundaries.insert(bytes.len());

    // Exception table
    let mut try_catches = vec![];
    for handler in &code.exception_table {
        let catch_type = match handler.catch_type {
            None => None,
            Some(class) => Some(pool.binary_name(class)?),
        };
        try_catches.push(TryCatch {
            start: labels.at(handler.start_pc.0 as usize)?,
            end: labels.at(handler.end_pc.0 as usize)?,
            handler: labels.at(handler.handler_pc.0 as usize)?,
            catch_type,
        });
    }

    // Debug tables
    let mut lines: BTreeMap<usize, u16> = BTreeMap::new();
    let mut local_variables = vec![];
    for attribute in &code.attributes {
        match pool.utf8(attribute.name_index) {
            Ok("LineNumberTable") => {
                let table: LineNumberTable = attribute.decode()?;
                for entry in table.0 {
                    let offset = entry.start_pc.0 as usize;
                    if labels.boundaries.contains(&offset) && offset < bytes.len() {
                        lines.insert(offset, entry.line_number);
                    }
                }
            }
            Ok("LocalVariableTable") => {
                let table: LocalVariableTable = attribute.decode()?;
                for entry in table.0 {
                    let start = entry.start_pc.0 as usize;
                    let end = start + entry.length as usize;
                    if !labels.boundaries.contains(&start) || !labels.boundaries.contains(&end) {
                        log::debug!("Dropping local variable entry with a misaligned range");
                        continue;
                    }
                    let name = UnqualifiedName::from_string(String::from(pool.utf8(entry.name_index)?))
                        .map_err(Error::BadName)?;
                    let descriptor = parse_field_type(pool.utf8(entry.descriptor_index)?)?;
                    local_variables.push(LocalVariableEntry {
                        name,
                        descriptor,
                        index: entry.index,
                        start: labels.at(start)?,
                        end: labels.at(end)?,
                    });
                }
            }

            // Stack map frames are always recomputed. Other debug tables would go stale.
            _ => (),
        }
    }

    // Jump targets
    let mut resolved: Vec<(usize, CodeElement)> = Vec::with_capacity(decoded.len());
    for (offset, insn) in decoded {
        let element = match insn {
            Decoded::Insn(insn) => CodeElement::Instruction(insn),
            Decoded::Branch(branch) => {
                for target in branch.jump_targets().targets() {
                    labels.at(*target)?;
                }
                CodeElement::Branch(branch.map_labels(
                    |target| labels.labels[target],
                    |target| labels.labels[target],
                ))
            }
        };
        resolved.push((offset, element));
    }

    let mut elements = vec![];
    for (offset, element) in resolved {
        if let Some(label) = labels.labels.get(&offset) {
            elements.push(CodeElement::Label(*label));
        }
        if let Some(line) = lines.get(&offset) {
            elements.push(CodeElement::Line(*line));
        }
        elements.push(element);
    }
    if let Some(label) = labels.labels.get(&bytes.len()) {
        elements.push(CodeElement::Label(*label));
    }

    Ok(MethodBody {
        max_locals: code.max_locals,
        elements,
        try_catches,
        local_variables,
        labels: labels.generator,
    })
}

/// Labels placed at bytecode offsets
struct LabelMap {
    /// Offsets at which an instruction starts (plus the end of the code)
    boundaries: HashSet<usize>,
    labels: BTreeMap<usize, SynLabel>,
    generator: SynLabelGenerator,
}

impl LabelMap {
    fn at(&mut self, offset: usize) -> Result<SynLabel, Error> {
        if !self.boundaries.contains(&offset) {
            return Err(Error::BadJumpTarget(offset));
        }
        let generator = &mut self.generator;
        Ok(*self
            .labels
            .entry(offset)
            .or_insert_with(|| generator.fresh_label()))
    }
}

fn parse_field_type(descriptor: &str) -> Result<FieldType<BinaryName>, Error> {
    FieldType::parse(descriptor)
}

fn parse_method_descriptor(descriptor: &str) -> Result<MethodDescriptor<BinaryName>, Error> {
    MethodDescriptor::parse(descriptor)
}

fn unqualified_name(name: &str) -> Result<UnqualifiedName, Error> {
    UnqualifiedName::from_string(String::from(name)).map_err(Error::BadName)
}

fn class_operand(pool: &ConstantsPool, index: u16) -> Result<RefType<BinaryName>, Error> {
    pool.ref_type(ClassConstantIndex(ConstantIndex(index)))
}

fn field_operand(pool: &ConstantsPool, index: u16) -> Result<FieldRef, Error> {
    let (class, name, descriptor) = pool.field_ref(FieldRefConstantIndex(ConstantIndex(index)))?;
    Ok(FieldRef {
        class: BinaryName::from_string(String::from(class)).map_err(Error::BadName)?,
        name: unqualified_name(name)?,
        descriptor: parse_field_type(descriptor)?,
    })
}

fn method_operand(pool: &ConstantsPool, index: u16) -> Result<MethodRef, Error> {
    let (class, name, descriptor, is_interface) =
        pool.method_ref(MethodRefConstantIndex(ConstantIndex(index)))?;
    Ok(MethodRef {
        class: RefType::from_class_constant(class)?,
        name: unqualified_name(name)?,
        descriptor: parse_method_descriptor(descriptor)?,
        is_interface,
    })
}

fn invoke_dynamic_operand(pool: &ConstantsPool, index: u16) -> Result<InvokeDynamicRef, Error> {
    let (bootstrap_method, name, descriptor) = pool.invoke_dynamic(ConstantIndex(index))?;
    Ok(InvokeDynamicRef {
        bootstrap_method,
        name: unqualified_name(name)?,
        descriptor: parse_method_descriptor(descriptor)?,
    })
}

fn ldc_operand(pool: &ConstantsPool, index: u16) -> Result<LdcConstant, Error> {
    let index = ConstantIndex(index);
    let pooled = |value_type: FieldType<BinaryName>| LdcConstant::Pooled { index, value_type };
    Ok(match pool.get(index)? {
        Constant::Integer(integer) => LdcConstant::Integer(*integer),
        Constant::Float(float) => LdcConstant::Float(*float),
        Constant::Long(long) => LdcConstant::Long(*long),
        Constant::Double(double) => LdcConstant::Double(*double),
        Constant::String(utf8) => match pool.get(*utf8)? {
            Constant::Utf8(string) => LdcConstant::String(string.clone()),
            _ => pooled(FieldType::object(BinaryName::STRING)),
        },
        Constant::Class(_) => LdcConstant::Class(pool.ref_type(ClassConstantIndex(index))?),
        Constant::MethodType { descriptor } => {
            LdcConstant::MethodType(parse_method_descriptor(pool.utf8(*descriptor)?)?)
        }
        Constant::MethodHandle { .. } => pooled(FieldType::object(BinaryName::METHODHANDLE)),
        Constant::Dynamic { name_and_type, .. } => {
            let (_, descriptor) = pool.name_and_type(*name_and_type)?;
            pooled(parse_field_type(descriptor)?)
        }
        _ => {
            return Err(Error::BadConstant {
                index: index.0,
                expected: "loadable constant",
            })
        }
    })
}

fn ord_comparison(opcode: u8, base: u8) -> OrdComparison {
    match opcode - base {
        0 => OrdComparison::EQ,
        1 => OrdComparison::NE,
        2 => OrdComparison::LT,
        3 => OrdComparison::GE,
        4 => OrdComparison::GT,
        _ => OrdComparison::LE,
    }
}

fn jump(offset: usize, relative: i64) -> Result<usize, Error> {
    usize::try_from(offset as i64 + relative).map_err(|_| Error::BadJumpTarget(offset))
}

fn decode_instruction(
    reader: &mut Cursor<&[u8]>,
    offset: usize,
    pool: &ConstantsPool,
) -> Result<Decoded, Error> {
    use Instruction::*;

    let opcode = u8::deserialize(reader)?;
    let insn: Insn = match opcode {
        0x00 => Nop,
        0x01 => AConstNull,
        0x02 => IConstM1,
        0x03 => IConst0,
        0x04 => IConst1,
        0x05 => IConst2,
        0x06 => IConst3,
        0x07 => IConst4,
        0x08 => IConst5,
        0x09 => LConst0,
        0x0a => LConst1,
        0x0b => FConst0,
        0x0c => FConst1,
        0x0d => FConst2,
        0x0e => DConst0,
        0x0f => DConst1,
        0x10 => BiPush(i8::deserialize(reader)?),
        0x11 => SiPush(i16::deserialize(reader)?),
        0x12 => Ldc(ldc_operand(pool, u8::deserialize(reader)? as u16)?),
        0x13 => Ldc(ldc_operand(pool, u16::deserialize(reader)?)?),
        0x14 => Ldc2(ldc_operand(pool, u16::deserialize(reader)?)?),
        0x15..=0x19 => load_or_store(opcode, u8::deserialize(reader)? as u16),
        0x1a..=0x2d => {
            let kind = (opcode - 0x1a) / 4;
            load_or_store(0x15 + kind, ((opcode - 0x1a) % 4) as u16)
        }
        0x2e => IALoad,
        0x2f => LALoad,
        0x30 => FALoad,
        0x31 => DALoad,
        0x32 => AALoad,
        0x33 => BALoad,
        0x34 => CALoad,
        0x35 => SALoad,
        0x36..=0x3a => load_or_store(opcode, u8::deserialize(reader)? as u16),
        0x3b..=0x4e => {
            let kind = (opcode - 0x3b) / 4;
            load_or_store(0x36 + kind, ((opcode - 0x3b) % 4) as u16)
        }
        0x4f => IAStore,
        0x50 => LAStore,
        0x51 => FAStore,
        0x52 => DAStore,
        0x53 => AAStore,
        0x54 => BAStore,
        0x55 => CAStore,
        0x56 => SAStore,
        0x57 => Pop,
        0x58 => Pop2,
        0x59 => Dup,
        0x5a => DupX1,
        0x5b => DupX2,
        0x5c => Dup2,
        0x5d => Dup2X1,
        0x5e => Dup2X2,
        0x5f => Swap,
        0x60 => IAdd,
        0x61 => LAdd,
        0x62 => FAdd,
        0x63 => DAdd,
        0x64 => ISub,
        0x65 => LSub,
        0x66 => FSub,
        0x67 => DSub,
        0x68 => IMul,
        0x69 => LMul,
        0x6a => FMul,
        0x6b => DMul,
        0x6c => IDiv,
        0x6d => LDiv,
        0x6e => FDiv,
        0x6f => DDiv,
        0x70 => IRem,
        0x71 => LRem,
        0x72 => FRem,
        0x73 => DRem,
        0x74 => INeg,
        0x75 => LNeg,
        0x76 => FNeg,
        0x77 => DNeg,
        0x78 => ISh(ShiftType::Left),
        0x79 => LSh(ShiftType::Left),
        0x7a => ISh(ShiftType::ArithmeticRight),
        0x7b => LSh(ShiftType::ArithmeticRight),
        0x7c => ISh(ShiftType::LogicalRight),
        0x7d => LSh(ShiftType::LogicalRight),
        0x7e => IAnd,
        0x7f => LAnd,
        0x80 => IOr,
        0x81 => LOr,
        0x82 => IXor,
        0x83 => LXor,
        0x84 => {
            let index = u8::deserialize(reader)?;
            let diff = i8::deserialize(reader)?;
            IInc(index as u16, diff as i16)
        }
        0x85 => I2L,
        0x86 => I2F,
        0x87 => I2D,
        0x88 => L2I,
        0x89 => L2F,
        0x8a => L2D,
        0x8b => F2I,
        0x8c => F2L,
        0x8d => F2D,
        0x8e => D2I,
        0x8f => D2L,
        0x90 => D2F,
        0x91 => I2B,
        0x92 => I2C,
        0x93 => I2S,
        0x94 => LCmp,
        0x95 => FCmp(CompareMode::L),
        0x96 => FCmp(CompareMode::G),
        0x97 => DCmp(CompareMode::L),
        0x98 => DCmp(CompareMode::G),

        0x99..=0xa7 | 0xaa..=0xb1 | 0xbf | 0xc6..=0xc8 => {
            return decode_branch(reader, opcode, offset)
        }
        0xa8 | 0xc9 => return Err(Error::UnsupportedInstruction("jsr")),
        0xa9 => return Err(Error::UnsupportedInstruction("ret")),

        0xb2 => GetStatic(field_operand(pool, u16::deserialize(reader)?)?),
        0xb3 => PutStatic(field_operand(pool, u16::deserialize(reader)?)?),
        0xb4 => GetField(field_operand(pool, u16::deserialize(reader)?)?),
        0xb5 => PutField(field_operand(pool, u16::deserialize(reader)?)?),
        0xb6 => Invoke(InvokeType::Virtual, method_operand(pool, u16::deserialize(reader)?)?),
        0xb7 => Invoke(InvokeType::Special, method_operand(pool, u16::deserialize(reader)?)?),
        0xb8 => Invoke(InvokeType::Static, method_operand(pool, u16::deserialize(reader)?)?),
        0xb9 => {
            let method = method_operand(pool, u16::deserialize(reader)?)?;
            let count = u8::deserialize(reader)?;
            let _zero = u8::deserialize(reader)?;
            Invoke(InvokeType::Interface(count), method)
        }
        0xba => {
            let call_site = invoke_dynamic_operand(pool, u16::deserialize(reader)?)?;
            let _zero = u16::deserialize(reader)?;
            InvokeDynamic(call_site)
        }
        0xbb => New(class_operand(pool, u16::deserialize(reader)?)?),
        0xbc => NewArray(match u8::deserialize(reader)? {
            4 => BaseType::Boolean,
            5 => BaseType::Char,
            6 => BaseType::Float,
            7 => BaseType::Double,
            8 => BaseType::Byte,
            9 => BaseType::Short,
            10 => BaseType::Int,
            11 => BaseType::Long,
            _ => return Err(Error::MalformedAttribute("Code")),
        }),
        0xbd => ANewArray(class_operand(pool, u16::deserialize(reader)?)?),
        0xbe => ArrayLength,
        0xc0 => CheckCast(class_operand(pool, u16::deserialize(reader)?)?),
        0xc1 => InstanceOf(class_operand(pool, u16::deserialize(reader)?)?),
        0xc2 => MonitorEnter,
        0xc3 => MonitorExit,
        0xc4 => {
            let modified = u8::deserialize(reader)?;
            match modified {
                0x15..=0x19 | 0x36..=0x3a => load_or_store(modified, u16::deserialize(reader)?),
                0x84 => {
                    let index = u16::deserialize(reader)?;
                    let diff = i16::deserialize(reader)?;
                    IInc(index, diff)
                }
                0xa9 => return Err(Error::UnsupportedInstruction("ret")),
                _ => return Err(Error::UnknownOpcode { opcode: modified, offset }),
            }
        }
        0xc5 => {
            let class = class_operand(pool, u16::deserialize(reader)?)?;
            let dimensions = u8::deserialize(reader)?;
            MultiANewArray(class, dimensions)
        }
        _ => return Err(Error::UnknownOpcode { opcode, offset }),
    };
    Ok(Decoded::Insn(insn))
}

/// Build a load or store from the opcode of its one-byte-operand form
fn load_or_store(opcode: u8, index: u16) -> Insn {
    match opcode {
        0x15 => Instruction::ILoad(index),
        0x16 => Instruction::LLoad(index),
        0x17 => Instruction::FLoad(index),
        0x18 => Instruction::DLoad(index),
        0x19 => Instruction::ALoad(index),
        0x36 => Instruction::IStore(index),
        0x37 => Instruction::LStore(index),
        0x38 => Instruction::FStore(index),
        0x39 => Instruction::DStore(index),
        _ => Instruction::AStore(index),
    }
}

fn decode_branch(
    reader: &mut Cursor<&[u8]>,
    opcode: u8,
    offset: usize,
) -> Result<Decoded, Error> {
    use BranchInstruction::*;

    let regular = |reader: &mut Cursor<&[u8]>| -> Result<usize, Error> {
        jump(offset, i16::deserialize(reader)? as i64)
    };

    let branch = match opcode {
        0x99..=0x9e => If(ord_comparison(opcode, 0x99), regular(reader)?),
        0x9f..=0xa4 => IfICmp(ord_comparison(opcode, 0x9f), regular(reader)?),
        0xa5 => IfACmp(EqComparison::EQ, regular(reader)?),
        0xa6 => IfACmp(EqComparison::NE, regular(reader)?),
        0xa7 => Goto(regular(reader)?),
        0xc8 => GotoW(jump(offset, i32::deserialize(reader)? as i64)?),
        0xc6 => IfNull(EqComparison::EQ, regular(reader)?),
        0xc7 => IfNull(EqComparison::NE, regular(reader)?),
        0xaa | 0xab => {
            let padding = ((4 - (offset + 1) % 4) % 4) as u8;
            for _ in 0..padding {
                reader.read_u8()?;
            }
            let default = jump(offset, i32::deserialize(reader)? as i64)?;
            if opcode == 0xaa {
                let low = i32::deserialize(reader)?;
                let high = i32::deserialize(reader)?;
                if high < low {
                    return Err(Error::MalformedAttribute("Code"));
                }
                let mut targets = vec![];
                for _ in low..=high {
                    targets.push(jump(offset, i32::deserialize(reader)? as i64)?);
                }
                TableSwitch {
                    padding,
                    default,
                    low,
                    targets,
                }
            } else {
                let count = i32::deserialize(reader)?;
                let mut targets = vec![];
                for _ in 0..count.max(0) {
                    let key = i32::deserialize(reader)?;
                    targets.push((key, jump(offset, i32::deserialize(reader)? as i64)?));
                }
                LookupSwitch {
                    padding,
                    default,
                    targets,
                }
            }
        }
        0xac => IReturn,
        0xad => LReturn,
        0xae => FReturn,
        0xaf => DReturn,
        0xb0 => AReturn,
        0xb1 => Return,
        _ => AThrow,
    };
    Ok(Decoded::Branch(branch))
}
