use super::{VType, VerificationType, VerifierFrame};
use crate::jvm::code::{CodeElement, JumpTargets, MethodBody, SynLabel};
use crate::jvm::hierarchy::{common_super_class, ClassLookup};
use crate::jvm::{BinaryName, Error, MethodDescriptor, UnqualifiedName, VerifierErrorKind};
use crate::util::{OffsetVec, Width};
use std::collections::HashMap;

/// Method whose body is being analyzed
pub struct MethodContext<'a> {
    pub this_class: &'a BinaryName,
    pub name: &'a UnqualifiedName,
    pub descriptor: &'a MethodDescriptor<BinaryName>,
    pub is_static: bool,

    /// Used to find common super classes where control flow meets
    pub lookup: &'a dyn ClassLookup,
}

/// Result of inferring the frames of a method body
#[derive(Debug)]
pub struct FrameAnalysis {
    /// Frame on entry to every element of the body (`None` for unreachable elements)
    pub frames: Vec<Option<VerifierFrame>>,

    /// Largest stack (in slots) seen anywhere
    pub max_stack: usize,

    /// Largest number of local variable slots seen anywhere
    pub max_locals: usize,
}

/// Infer the frame at every element of a method body
///
/// This is a worklist algorithm: elements get revisited until the frames flowing into them stop
/// changing. Elements which never get reached are left without a frame.
pub fn analyze(body: &MethodBody, method: &MethodContext<'_>) -> Result<FrameAnalysis, Error> {
    let elements = &body.elements;
    let entry = VerifierFrame::method_entry(
        method.this_class,
        method.name,
        method.descriptor,
        method.is_static,
    );

    let mut label_indices: HashMap<SynLabel, usize> = HashMap::new();
    for (idx, element) in elements.iter().enumerate() {
        if let CodeElement::Label(label) = element {
            label_indices.insert(*label, idx);
        }
    }
    let resolve = |label: &SynLabel| -> Result<usize, Error> {
        label_indices
            .get(label)
            .copied()
            .ok_or(Error::MalformedAttribute("Code"))
    };

    // Element ranges covered by each handler
    let mut handlers = vec![];
    for try_catch in &body.try_catches {
        handlers.push((
            resolve(&try_catch.start)?..resolve(&try_catch.end)?,
            resolve(&try_catch.handler)?,
            try_catch.catch_type.as_ref(),
        ));
    }

    let mut analysis = FrameAnalysis {
        frames: vec![None; elements.len()],
        max_stack: 0,
        max_locals: entry.locals.len(),
    };
    let mut worklist = Worklist::new(elements.len());
    analysis.flow_into(0, entry, method.lookup, &mut worklist)?;

    while let Some(idx) = worklist.pop() {
        let frame_in = match &analysis.frames[idx] {
            Some(frame) => frame.clone(),
            None => continue,
        };
        let mut frame = frame_in.clone();

        match &elements[idx] {
            CodeElement::Label(_) | CodeElement::Line(_) => {
                analysis.flow_into(idx + 1, frame, method.lookup, &mut worklist)?;
            }

            CodeElement::Instruction(insn) => {
                frame
                    .verify_instruction(insn, idx, method.this_class)
                    .map_err(|kind| Error::VerifierError {
                        index: idx,
                        instruction: format!("{:?}", insn),
                        kind,
                    })?;
                analysis.observe(&frame);
                for (range, handler, catch_type) in &handlers {
                    if range.contains(&idx) {
                        for state in [&frame_in, &frame] {
                            let handler_frame = state.handler_entry(*catch_type);
                            analysis.flow_into(*handler, handler_frame, method.lookup, &mut worklist)?;
                        }
                    }
                }
                analysis.flow_into(idx + 1, frame, method.lookup, &mut worklist)?;
            }

            CodeElement::Branch(branch) => {
                frame
                    .verify_branch_instruction(branch, method.descriptor.return_type.as_ref())
                    .map_err(|kind| Error::VerifierError {
                        index: idx,
                        instruction: format!("{:?}", branch),
                        kind,
                    })?;
                analysis.observe(&frame);
                for (range, handler, catch_type) in &handlers {
                    if range.contains(&idx) {
                        let handler_frame = frame_in.handler_entry(*catch_type);
                        analysis.flow_into(*handler, handler_frame, method.lookup, &mut worklist)?;
                    }
                }

                let targets = match branch.jump_targets() {
                    JumpTargets::None => vec![],
                    JumpTargets::Regular(label) | JumpTargets::Wide(label) => vec![label],
                    JumpTargets::WideMany(labels) => labels,
                };
                for target in targets {
                    let target_idx = resolve(&target)?;
                    analysis.flow_into(target_idx, frame.clone(), method.lookup, &mut worklist)?;
                }
                if branch.falls_through() {
                    analysis.flow_into(idx + 1, frame, method.lookup, &mut worklist)?;
                }
            }
        }
    }

    Ok(analysis)
}

impl FrameAnalysis {
    fn observe(&mut self, frame: &VerifierFrame) {
        self.max_stack = self.max_stack.max(frame.stack.offset_len().0);
        self.max_locals = self.max_locals.max(frame.locals.len());
    }

    /// Merge a frame into the frame at `idx`, scheduling `idx` if anything changed
    fn flow_into(
        &mut self,
        idx: usize,
        incoming: VerifierFrame,
        lookup: &dyn ClassLookup,
        worklist: &mut Worklist,
    ) -> Result<(), Error> {
        let slot = match self.frames.get_mut(idx) {
            Some(slot) => slot,
            None => {
                return Err(Error::VerifierError {
                    index: idx,
                    instruction: String::from("<end of method>"),
                    kind: VerifierErrorKind::FallsOffEnd,
                })
            }
        };
        self.max_stack = self.max_stack.max(incoming.stack.offset_len().0);

        let updated = match slot {
            None => incoming,
            Some(existing) => {
                let merged = merge_frames(idx, existing, &incoming, lookup)?;
                if merged == *existing {
                    return Ok(());
                }
                merged
            }
        };
        *slot = Some(updated);
        worklist.push(idx);
        Ok(())
    }
}

/// Frame which is compatible with both of the frames
fn merge_frames(
    idx: usize,
    frame1: &VerifierFrame,
    frame2: &VerifierFrame,
    lookup: &dyn ClassLookup,
) -> Result<VerifierFrame, Error> {
    if frame1.stack.len() != frame2.stack.len() {
        return Err(Error::IncompatibleFrames(idx));
    }
    let mut stack = OffsetVec::new();
    for ((_, _, type1), (_, _, type2)) in frame1.stack.iter().zip(frame2.stack.iter()) {
        match merge_types(type1, type2, lookup)? {
            VerificationType::Top => return Err(Error::IncompatibleFrames(idx)),
            merged => {
                stack.push(merged);
            }
        }
    }

    let len = frame1.locals.len().max(frame2.locals.len());
    let mut locals: Vec<VType> = (0..len)
        .map(|i| {
            let type1 = frame1.locals.get(i).unwrap_or(&VerificationType::Top);
            let type2 = frame2.locals.get(i).unwrap_or(&VerificationType::Top);
            merge_types(type1, type2, lookup)
        })
        .collect::<Result<_, _>>()?;

    // A wide value whose second half didn't survive is unusable
    for i in 0..len {
        if locals[i].width() == 2 && locals.get(i + 1) != Some(&VerificationType::Top) {
            locals[i] = VerificationType::Top;
        }
    }

    Ok(VerifierFrame { locals, stack })
}

fn merge_types(type1: &VType, type2: &VType, lookup: &dyn ClassLookup) -> Result<VType, Error> {
    use VerificationType::*;

    let merged = match (type1, type2) {
        _ if type1 == type2 => type1.clone(),
        (Null, Object(_)) => type2.clone(),
        (Object(_), Null) => type1.clone(),
        (Object(ref1), Object(ref2)) => Object(common_super_class(lookup, ref1, ref2)?),
        _ => Top,
    };
    Ok(merged)
}

/// Stack of elements to (re)visit, without duplicates
struct Worklist {
    pending: Vec<usize>,
    queued: Vec<bool>,
}

impl Worklist {
    fn new(len: usize) -> Worklist {
        Worklist {
            pending: vec![],
            queued: vec![false; len],
        }
    }

    fn push(&mut self, idx: usize) {
        if !self.queued[idx] {
            self.queued[idx] = true;
            self.pending.push(idx);
        }
    }

    fn pop(&mut self) -> Option<usize> {
        let idx = self.pending.pop()?;
        self.queued[idx] = false;
        Some(idx)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{BranchInstruction, Insn, Instruction, OrdComparison, TryCatch};
    use crate::jvm::hierarchy::{jdk_classes, NoClasses};
    use crate::jvm::{FieldType, Name, RefType};

    fn class(name: &str) -> BinaryName {
        BinaryName::from_string(String::from(name)).unwrap()
    }

    fn int_to_int() -> MethodDescriptor<BinaryName> {
        MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: Some(FieldType::int()),
        }
    }

    #[test]
    fn loop_and_join() {
        let this_class = class("org/example/Counter");
        let descriptor = int_to_int();
        let name = UnqualifiedName::from_string(String::from("count")).unwrap();
        let method = MethodContext {
            this_class: &this_class,
            name: &name,
            descriptor: &descriptor,
            is_static: true,
            lookup: &NoClasses,
        };

        // int count(int n) { long acc = 0; while (n > 0) { n--; } return n; }
        let mut body = MethodBody::new();
        let head = body.fresh_label();
        let exit = body.fresh_label();
        body.push(Instruction::LConst0);
        body.push(Instruction::LStore(1));
        body.place_label(head);
        body.push(Instruction::ILoad(0));
        body.push_branch(BranchInstruction::If(OrdComparison::LE, exit));
        body.push(Instruction::IInc(0, -1));
        body.push_branch(BranchInstruction::Goto(head));
        body.place_label(exit);
        body.push(Insn::load(&FieldType::int(), 0));
        body.push_branch(BranchInstruction::IReturn);

        let analysis = analyze(&body, &method).unwrap();
        assert_eq!(analysis.max_stack, 2);
        assert_eq!(analysis.max_locals, 3);

        let at_head = analysis.frames[2].as_ref().unwrap();
        assert_eq!(
            at_head.locals,
            vec![VerificationType::Integer, VerificationType::Long, VerificationType::Top]
        );
        assert!(analysis.frames.iter().all(Option::is_some));
    }

    #[test]
    fn handler_and_dead_code() {
        let this_class = class("org/example/Guarded");
        let descriptor = MethodDescriptor {
            parameters: vec![],
            return_type: None,
        };
        let name = UnqualifiedName::from_string(String::from("run")).unwrap();
        let method = MethodContext {
            this_class: &this_class,
            name: &name,
            descriptor: &descriptor,
            is_static: false,
            lookup: &NoClasses,
        };

        let mut body = MethodBody::new();
        let start = body.fresh_label();
        let end = body.fresh_label();
        let handler = body.fresh_label();
        body.place_label(start);
        body.push(Instruction::ALoad(0));
        body.push(Instruction::MonitorEnter);
        body.place_label(end);
        body.push_branch(BranchInstruction::Return);
        body.push(Instruction::Nop);
        body.place_label(handler);
        body.push_branch(BranchInstruction::AThrow);
        body.try_catches.push(TryCatch {
            start,
            end,
            handler,
            catch_type: Some(class("java/lang/RuntimeException")),
        });

        let analysis = analyze(&body, &method).unwrap();
        assert!(analysis.frames[5].is_none(), "nop is unreachable");
        let at_handler = analysis.frames[6].as_ref().unwrap();
        assert_eq!(
            at_handler.stack.iter().map(|(_, _, t)| t.clone()).collect::<Vec<_>>(),
            vec![VerificationType::Object(RefType::Object(class("java/lang/RuntimeException")))]
        );
    }

    /// ```text,ignore,no_run
    /// static int pick(boolean flag) {
    ///     AbstractList list = flag ? new ArrayList() : new LinkedList();
    ///     return list.size();
    /// }
    /// ```
    fn pick_body() -> MethodBody {
        let void = MethodDescriptor {
            parameters: vec![],
            return_type: None,
        };
        let mut body = MethodBody::new();
        let linked = body.fresh_label();
        let join = body.fresh_label();
        body.push(Instruction::ILoad(0));
        body.push_branch(BranchInstruction::If(OrdComparison::EQ, linked));
        for (list, end) in [("java/util/ArrayList", Some(join)), ("java/util/LinkedList", None)] {
            body.push(Instruction::New(RefType::Object(class(list))));
            body.push(Instruction::Dup);
            body.push(Insn::invoke_special(class(list), UnqualifiedName::INIT, void.clone()));
            match end {
                Some(end) => {
                    body.push_branch(BranchInstruction::Goto(end));
                    body.place_label(linked);
                }
                None => body.place_label(join),
            }
        }
        body.push(Instruction::AStore(1));
        body.push(Instruction::ALoad(1));
        body.push(Insn::invoke_virtual(
            class("java/util/AbstractList"),
            UnqualifiedName::from_string(String::from("size")).unwrap(),
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::int()),
            },
        ));
        body.push_branch(BranchInstruction::IReturn);
        body
    }

    #[test]
    fn merging_unrelated_classes_needs_their_hierarchy() {
        let this_class = class("org/example/Lists");
        let descriptor = MethodDescriptor {
            parameters: vec![FieldType::boolean()],
            return_type: Some(FieldType::int()),
        };
        let name = UnqualifiedName::from_string(String::from("pick")).unwrap();
        let body = pick_body();

        let blind = MethodContext {
            this_class: &this_class,
            name: &name,
            descriptor: &descriptor,
            is_static: true,
            lookup: &NoClasses,
        };
        match analyze(&body, &blind) {
            Err(Error::UnknownClass(missing)) => assert_eq!(missing, "java/util/ArrayList"),
            other => panic!("unexpected result {:?}", other),
        }

        let lookup = jdk_classes();
        let informed = MethodContext {
            lookup: &lookup,
            ..blind
        };
        let analysis = analyze(&body, &informed).unwrap();
        let at_join = analysis.frames[10].as_ref().unwrap();
        assert_eq!(
            at_join.stack.iter().map(|(_, _, t)| t.clone()).collect::<Vec<_>>(),
            vec![VerificationType::Object(RefType::Object(class("java/util/AbstractList")))]
        );
    }

    #[test]
    fn falling_off_the_end() {
        let this_class = class("org/example/Broken");
        let descriptor = int_to_int();
        let name = UnqualifiedName::from_string(String::from("broken")).unwrap();
        let method = MethodContext {
            this_class: &this_class,
            name: &name,
            descriptor: &descriptor,
            is_static: true,
            lookup: &NoClasses,
        };

        let mut body = MethodBody::new();
        body.push(Instruction::ILoad(0));
        match analyze(&body, &method) {
            Err(Error::VerifierError { kind, .. }) => assert_eq!(kind, VerifierErrorKind::FallsOffEnd),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
