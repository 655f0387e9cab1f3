//! Encoding of [`MethodBody`] back into a `Code` attribute
//!
//! Encoding recomputes everything that depends on the layout of the bytecode: jump offsets, switch
//! padding, the exception table, debug tables, stack map frames, and the maximum stack and locals.
//!
//! ### Oversized jumps
//!
//! `goto` and the `if*` instructions only have a signed 16-bit relative offset. Jumps which don't
//! fit get rewritten, growing the code around them (which may in turn make other jumps too long,
//! hence the layout is repeated until it stops changing):
//!
//! ```text,ignore,no_run
//!     goto L2         =>    goto_w L2
//!
//!                           ifnot* L1
//!     if* L2          =>    goto_w L2
//! L1: ...               L1: ...
//! ```
//!
//! Since the number of jumps that can be widened only ever decreases, this always terminates.
//! Switch padding is recomputed on every pass, so rewrites needn't preserve alignment.

use crate::jvm::class_file::{
    Attribute, BytecodeArray, BytecodeIndex, Code, ConstantsPool, ExceptionHandler,
    LineNumber, LineNumberTable, LocalVariable, LocalVariableTable, Serialize, StackMapTable,
    Version,
};
use crate::jvm::code::{
    BranchInstruction, CodeElement, Instruction, JumpTargets, MethodBody, SerializableInstruction,
    SynLabel,
};
use crate::jvm::verifier::{analyze, MethodContext, SerializableFrame, VerifierFrame};
use crate::jvm::{Error, Name, RenderDescriptor};
use crate::util::Width;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;

/// Range of relative jump offsets supported by `goto` and `if*` branch instructions
const SIGNED_16BIT_JUMP_RANGE: Range<isize> = Range {
    start: i16::MIN as isize,
    end: i16::MAX as isize + 1,
};

/// Longest method body the class file format allows
const MAX_CODE_LENGTH: usize = u16::MAX as usize;

/// Encode a method body
///
/// Instructions that can't be reached are left out entirely.
pub fn encode_body(
    body: &MethodBody,
    constants: &mut ConstantsPool,
    method: &MethodContext<'_>,
    version: Version,
) -> Result<Code, Error> {
    let analysis = analyze(body, method)?;
    let frames = &analysis.frames;

    // Drop dead code, resolve constants
    let mut items: Vec<Item> = vec![];
    for (idx, element) in body.elements.iter().enumerate() {
        let live = frames[idx].is_some();
        match element {
            CodeElement::Label(label) => items.push(Item::Label(idx, *label)),
            CodeElement::Line(line) if live => items.push(Item::Line(*line)),
            CodeElement::Instruction(insn) if live => {
                let serializable = insn.serializable(constants)?;
                items.push(Item::Instruction(idx, serializable));
            }
            CodeElement::Branch(branch) if live => items.push(Item::Branch {
                idx,
                branch: branch.clone(),
                widened: false,
            }),
            _ => (),
        }
    }

    let layout = layout(&mut items)?;

    // Emit the bytecode
    let mut code_array: Vec<u8> = Vec::with_capacity(layout.code_length);
    let mut new_offsets: HashMap<usize, u16> = HashMap::new();
    let mut frame_offsets: BTreeMap<usize, &VerifierFrame> = BTreeMap::new();
    let mut jump_targets: HashSet<SynLabel> = HashSet::new();
    for (item, offset) in items.iter().zip(&layout.offsets) {
        let offset = *offset;
        match item {
            Item::Label(..) | Item::Line(_) => (),
            Item::Instruction(idx, insn) => {
                if let Instruction::New(_) = insn {
                    new_offsets.insert(*idx, offset as u16);
                }
                insn.serialize(&mut code_array)?;
            }
            Item::Branch {
                idx,
                branch,
                widened,
            } => {
                jump_targets.extend(branch.jump_targets().targets().iter().copied());
                let relative = |label: &SynLabel| layout.labels[label] as isize - offset as isize;
                if *widened {
                    if branch.falls_through() {
                        let inverted = invert_condition(branch).map_labels(|_| 8i16, |_| 0i32);
                        inverted.serialize(&mut code_array)?;
                        let target = widened_target(branch);
                        let goto_w: BranchInstruction<i16, i32> =
                            BranchInstruction::GotoW((relative(&target) - 3) as i32);
                        goto_w.serialize(&mut code_array)?;
                        if let Some(frame) = &frames[*idx + 1] {
                            frame_offsets.insert(offset + 8, frame);
                        }
                    } else {
                        let target = widened_target(branch);
                        let goto_w: BranchInstruction<i16, i32> =
                            BranchInstruction::GotoW(relative(&target) as i32);
                        goto_w.serialize(&mut code_array)?;
                    }
                } else {
                    let padding = switch_padding(offset);
                    let encoded = with_padding(
                        branch.map_labels(|lbl| relative(lbl) as i16, |lbl| relative(lbl) as i32),
                        padding,
                    );
                    encoded.serialize(&mut code_array)?;
                }
            }
        }
    }
    debug_assert_eq!(code_array.len(), layout.code_length);

    // Exception table (handlers in dead code are dropped along with their code)
    let mut exception_table = vec![];
    let mut handler_labels = HashSet::new();
    for try_catch in &body.try_catches {
        let handler_live = layout
            .label_elements
            .get(&try_catch.handler)
            .map_or(false, |idx| frames[*idx].is_some());
        let start = layout.labels[&try_catch.start];
        let end = layout.labels[&try_catch.end];
        if !handler_live || start >= end {
            continue;
        }
        handler_labels.insert(try_catch.handler);
        let catch_type = match &try_catch.catch_type {
            Some(class) => Some(constants.get_class(class.as_str())?),
            None => None,
        };
        exception_table.push(ExceptionHandler {
            start_pc: BytecodeIndex(start as u16),
            end_pc: BytecodeIndex(end as u16),
            handler_pc: BytecodeIndex(layout.labels[&try_catch.handler] as u16),
            catch_type,
        });
    }

    // Frames at every jump target (the last label at an offset wins)
    for item in &items {
        if let Item::Label(_, label) = item {
            if !jump_targets.contains(label) && !handler_labels.contains(label) {
                continue;
            }
            let idx = layout.label_elements[label];
            if let Some(frame) = &frames[idx] {
                frame_offsets.insert(layout.labels[label], frame);
            }
        }
    }

    let mut attributes: Vec<Attribute> = vec![];
    if version.requires_stack_map_frames() && !frame_offsets.is_empty() {
        let mut stack_map_frames = vec![];
        let mut previous = match &frames[0] {
            Some(entry) => entry.into_serializable(constants, &new_offsets)?,
            None => SerializableFrame {
                locals: vec![],
                stack: vec![],
            },
        };
        let mut previous_offset: Option<usize> = None;
        for (offset, frame) in &frame_offsets {
            let frame = frame.into_serializable(constants, &new_offsets)?;
            let offset_delta = match previous_offset {
                None => *offset,
                Some(previous_offset) => offset - previous_offset - 1,
            };
            stack_map_frames.push(frame.stack_map_frame(offset_delta as u16, &previous));
            previous = frame;
            previous_offset = Some(*offset);
        }
        attributes.push(constants.get_attribute(StackMapTable(stack_map_frames))?);
    }

    // Line numbers
    let mut line_numbers: Vec<LineNumber> = vec![];
    for (item, offset) in items.iter().zip(&layout.offsets) {
        if let Item::Line(line) = item {
            let start_pc = BytecodeIndex(*offset as u16);
            match line_numbers.last_mut() {
                Some(last) if last.start_pc == start_pc => last.line_number = *line,
                _ => line_numbers.push(LineNumber {
                    start_pc,
                    line_number: *line,
                }),
            }
        }
    }
    if !line_numbers.is_empty() {
        attributes.push(constants.get_attribute(LineNumberTable(line_numbers))?);
    }

    // Local variables
    let mut max_locals = analysis.max_locals.max(body.max_locals as usize);
    let mut local_variables = vec![];
    for local in &body.local_variables {
        let (start, end) = match (layout.labels.get(&local.start), layout.labels.get(&local.end)) {
            (Some(start), Some(end)) if start < end => (*start, *end),
            _ => continue,
        };
        max_locals = max_locals.max(local.index as usize + local.descriptor.width());
        local_variables.push(LocalVariable {
            start_pc: BytecodeIndex(start as u16),
            length: (end - start) as u16,
            name_index: constants.get_utf8(local.name.as_str())?,
            descriptor_index: constants.get_utf8(local.descriptor.render())?,
            index: local.index,
        });
    }
    if !local_variables.is_empty() {
        attributes.push(constants.get_attribute(LocalVariableTable(local_variables))?);
    }

    let max_stack = u16::try_from(analysis.max_stack)
        .map_err(|_| Error::MethodCodeMaxStackOverflow(analysis.max_stack))?;
    let max_locals =
        u16::try_from(max_locals).map_err(|_| Error::MethodCodeMaxLocalsOverflow(max_locals))?;

    Ok(Code {
        max_stack,
        max_locals,
        code_array: BytecodeArray(code_array),
        exception_table,
        attributes,
    })
}

/// Element of the body which survived dead code elimination
enum Item {
    Label(usize, SynLabel),
    Line(u16),
    Instruction(usize, SerializableInstruction),
    Branch {
        idx: usize,
        branch: BranchInstruction<SynLabel, SynLabel>,

        /// Jump has been rewritten to use `goto_w`
        widened: bool,
    },
}

struct Layout {
    /// Offset of every item
    offsets: Vec<usize>,

    /// Offset of every label
    labels: HashMap<SynLabel, usize>,

    /// Element index of every label
    label_elements: HashMap<SynLabel, usize>,

    code_length: usize,
}

/// Assign offsets to items, widening jumps until everything fits
fn layout(items: &mut [Item]) -> Result<Layout, Error> {
    let label_elements: HashMap<SynLabel, usize> = items
        .iter()
        .filter_map(|item| match item {
            Item::Label(idx, label) => Some((*label, *idx)),
            _ => None,
        })
        .collect();

    loop {
        let mut offsets = Vec::with_capacity(items.len());
        let mut labels = HashMap::new();
        let mut offset = 0;
        for item in items.iter() {
            offsets.push(offset);
            if let Item::Label(_, label) = item {
                labels.insert(*label, offset);
            }
            offset += item_width(item, offset);
        }

        let mut changed = false;
        for (item, item_offset) in items.iter_mut().zip(&offsets) {
            if let Item::Branch {
                branch, widened, ..
            } = item
            {
                if *widened {
                    continue;
                }
                let target = match branch {
                    BranchInstruction::Goto(target)
                    | BranchInstruction::If(_, target)
                    | BranchInstruction::IfICmp(_, target)
                    | BranchInstruction::IfACmp(_, target)
                    | BranchInstruction::IfNull(_, target) => *target,
                    _ => continue,
                };
                let relative = labels[&target] as isize - *item_offset as isize;
                if !SIGNED_16BIT_JUMP_RANGE.contains(&relative) {
                    *widened = true;
                    changed = true;
                }
            }
        }

        if !changed {
            if offset > MAX_CODE_LENGTH {
                return Err(Error::MethodCodeOverflow(offset));
            }
            return Ok(Layout {
                offsets,
                labels,
                label_elements,
                code_length: offset,
            });
        }
    }
}

fn item_width(item: &Item, offset: usize) -> usize {
    match item {
        Item::Label(..) | Item::Line(_) => 0,
        Item::Instruction(_, insn) => insn.width(),
        Item::Branch {
            widened: true,
            branch,
            ..
        } => {
            if branch.falls_through() {
                8
            } else {
                5
            }
        }
        Item::Branch { branch, .. } => with_padding(branch.clone(), switch_padding(offset)).width(),
    }
}

/// Padding needed after a switch opcode at this offset to align its operands
fn switch_padding(offset: usize) -> u8 {
    ((4 - (offset + 1) % 4) % 4) as u8
}

fn with_padding<Lbl, LblWide>(
    branch: BranchInstruction<Lbl, LblWide>,
    new_padding: u8,
) -> BranchInstruction<Lbl, LblWide> {
    match branch {
        BranchInstruction::TableSwitch {
            default,
            low,
            targets,
            ..
        } => BranchInstruction::TableSwitch {
            padding: new_padding,
            default,
            low,
            targets,
        },
        BranchInstruction::LookupSwitch {
            default, targets, ..
        } => BranchInstruction::LookupSwitch {
            padding: new_padding,
            default,
            targets,
        },
        other => other,
    }
}

fn widened_target(branch: &BranchInstruction<SynLabel, SynLabel>) -> SynLabel {
    match branch.jump_targets() {
        JumpTargets::Regular(target) | JumpTargets::Wide(target) => target,
        JumpTargets::None | JumpTargets::WideMany(_) => SynLabel::START,
    }
}

/// Flip the condition of a conditional jump
fn invert_condition(
    branch: &BranchInstruction<SynLabel, SynLabel>,
) -> BranchInstruction<SynLabel, SynLabel> {
    match branch {
        BranchInstruction::If(cmp, target) => BranchInstruction::If(!*cmp, *target),
        BranchInstruction::IfICmp(cmp, target) => BranchInstruction::IfICmp(!*cmp, *target),
        BranchInstruction::IfACmp(cmp, target) => BranchInstruction::IfACmp(!*cmp, *target),
        BranchInstruction::IfNull(cmp, target) => BranchInstruction::IfNull(!*cmp, *target),
        other => other.clone(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::StackMapFrame;
    use crate::jvm::code::{decode_body, Insn, Instruction, OrdComparison};
    use crate::jvm::hierarchy::NoClasses;
    use crate::jvm::{BinaryName, FieldType, MethodDescriptor, UnqualifiedName};

    fn context<'a>(
        this_class: &'a BinaryName,
        name: &'a UnqualifiedName,
        descriptor: &'a MethodDescriptor<BinaryName>,
    ) -> MethodContext<'a> {
        MethodContext {
            this_class,
            name,
            descriptor,
            is_static: true,
            lookup: &NoClasses,
        }
    }

    fn abs_body() -> MethodBody {
        // static int abs(int x) { return x < 0 ? -x : x; }
        let mut body = MethodBody::new();
        let positive = body.fresh_label();
        body.push(Instruction::ILoad(0));
        body.push_branch(BranchInstruction::If(OrdComparison::GE, positive));
        body.push(Instruction::ILoad(0));
        body.push(Instruction::INeg);
        body.push_branch(BranchInstruction::IReturn);
        body.place_label(positive);
        body.push(Insn::load(&FieldType::int(), 0));
        body.push_branch(BranchInstruction::IReturn);
        body
    }

    #[test]
    fn encode_with_frames() {
        let this_class = BinaryName::from_string(String::from("org/example/Maths")).unwrap();
        let name = UnqualifiedName::from_string(String::from("abs")).unwrap();
        let descriptor = MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: Some(FieldType::int()),
        };
        let mut constants = ConstantsPool::new();
        let code = encode_body(
            &abs_body(),
            &mut constants,
            &context(&this_class, &name, &descriptor),
            Version::JAVA8,
        )
        .unwrap();

        assert_eq!(
            code.code_array.0,
            vec![0x1a, 0x9c, 0x00, 0x06, 0x1a, 0x74, 0xac, 0x1a, 0xac]
        );
        assert_eq!(code.max_stack, 1);
        assert_eq!(code.max_locals, 1);

        let frames: StackMapTable = code.attributes[0].decode().unwrap();
        assert_eq!(
            frames.0,
            vec![StackMapFrame::SameLocalsNoStack { offset_delta: 7 }]
        );

        // Decoding the encoded code gives back an equivalent body
        let decoded = decode_body(&code, &constants).unwrap();
        assert_eq!(decoded.instruction_count(), 7);
    }

    #[test]
    fn old_class_files_have_no_frames() {
        let this_class = BinaryName::from_string(String::from("org/example/Maths")).unwrap();
        let name = UnqualifiedName::from_string(String::from("abs")).unwrap();
        let descriptor = MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: Some(FieldType::int()),
        };
        let mut constants = ConstantsPool::new();
        let code = encode_body(
            &abs_body(),
            &mut constants,
            &context(&this_class, &name, &descriptor),
            Version {
                major_version: 49,
                minor_version: 0,
            },
        )
        .unwrap();
        assert!(code.attributes.is_empty());
    }

    #[test]
    fn long_jumps_are_widened() {
        let this_class = BinaryName::from_string(String::from("org/example/Big")).unwrap();
        let name = UnqualifiedName::from_string(String::from("big")).unwrap();
        let descriptor = MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: None,
        };

        let mut body = MethodBody::new();
        let end = body.fresh_label();
        body.push(Instruction::ILoad(0));
        body.push_branch(BranchInstruction::If(OrdComparison::EQ, end));
        for _ in 0..20_000 {
            body.push(Instruction::IInc(0, 1));
        }
        body.place_label(end);
        body.push_branch(BranchInstruction::Return);

        let mut constants = ConstantsPool::new();
        let code = encode_body(
            &body,
            &mut constants,
            &context(&this_class, &name, &descriptor),
            Version::JAVA8,
        )
        .unwrap();
        let bytes = &code.code_array.0;

        // iload_0; ifne +8; goto_w <end>
        assert_eq!(&bytes[..4], &[0x1a, 0x9a, 0x00, 0x08]);
        assert_eq!(bytes[4], 0xc8);
        assert_eq!(bytes.len(), 1 + 8 + 20_000 * 3 + 1);

        let frames: StackMapTable = code.attributes[0].decode().unwrap();
        assert_eq!(frames.0.len(), 2);
        assert_eq!(
            frames.0[0],
            StackMapFrame::SameLocalsNoStack { offset_delta: 9 }
        );
    }
}
