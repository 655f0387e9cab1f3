use super::{UninitializedRef, VType, VerificationType};
use crate::jvm::class_file::{ClassConstantIndex, ConstantPoolOverflow, ConstantsPool, StackMapFrame};
use crate::jvm::code::{BranchInstruction, Insn, Instruction, InvokeType};
use crate::jvm::{
    ArrayType, BaseType, BinaryName, FieldType, MethodDescriptor, RefType, UnqualifiedName,
    VerifierErrorKind,
};
use crate::util::{OffsetVec, Width};
use std::collections::HashMap;

/// Snapshot of the stack and local variables at a point in the bytecode
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame<Cls, U> {
    /// One entry per local variable slot (the slot after a `long` or `double` holds `Top`)
    pub locals: Vec<VerificationType<Cls, U>>,

    /// Types of values on the stack
    pub stack: OffsetVec<VerificationType<Cls, U>>,
}

/// Frame tracked while computing the stack map table
pub type VerifierFrame = Frame<RefType<BinaryName>, UninitializedRef>;

/// Frame in the form stored in the class file
///
/// Unlike [`Frame`], `long` and `double` locals take up only one entry here and trailing `Top`
/// locals are dropped.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SerializableFrame {
    pub locals: Vec<VerificationType<ClassConstantIndex, u16>>,
    pub stack: Vec<VerificationType<ClassConstantIndex, u16>>,
}

impl VerifierFrame {
    /// Frame on entry to a method
    pub fn method_entry(
        this_class: &BinaryName,
        method_name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
        is_static: bool,
    ) -> VerifierFrame {
        let mut locals = vec![];
        if !is_static {
            if *method_name == UnqualifiedName::INIT && *this_class != BinaryName::OBJECT {
                locals.push(VerificationType::UninitializedThis);
            } else {
                locals.push(VerificationType::Object(RefType::Object(this_class.clone())));
            }
        }
        for parameter in &descriptor.parameters {
            let vtype = VType::from(parameter.clone());
            let width = vtype.width();
            locals.push(vtype);
            if width == 2 {
                locals.push(VerificationType::Top);
            }
        }
        Frame {
            locals,
            stack: OffsetVec::new(),
        }
    }

    /// Update the frame to reflect the effects of the given (non-branching) instruction
    ///
    /// `element` is the position of the instruction in the method body, which is how objects
    /// created by `new` are identified until they are initialized.
    pub fn verify_instruction(
        &mut self,
        insn: &Insn,
        element: usize,
        this_class: &BinaryName,
    ) -> Result<(), VerifierErrorKind> {
        verify_instruction(self, insn, element, this_class)
    }

    /// Update the frame to reflect the effects of the given branching instruction
    pub fn verify_branch_instruction<Lbl, LblWide>(
        &mut self,
        insn: &BranchInstruction<Lbl, LblWide>,
        return_type: Option<&FieldType<BinaryName>>,
    ) -> Result<(), VerifierErrorKind> {
        verify_branch_instruction(self, insn, return_type)
    }

    /// Frame at the start of an exception handler covering code with these locals
    pub fn handler_entry(&self, catch_type: Option<&BinaryName>) -> VerifierFrame {
        let exception = catch_type.cloned().unwrap_or(BinaryName::THROWABLE);
        let mut stack = OffsetVec::new();
        stack.push(VerificationType::Object(RefType::Object(exception)));
        Frame {
            locals: self.locals.clone(),
            stack,
        }
    }

    /// Resolve the frame into its serializable form
    pub fn into_serializable(
        &self,
        constants_pool: &mut ConstantsPool,
        new_offsets: &HashMap<usize, u16>,
    ) -> Result<SerializableFrame, ConstantPoolOverflow> {
        let mut locals = vec![];
        let mut slots = self.locals.iter();
        while let Some(local) = slots.next() {
            locals.push(local.into_serializable(constants_pool, new_offsets)?);
            if local.width() == 2 {
                slots.next();
            }
        }
        while let Some(VerificationType::Top) = locals.last() {
            locals.pop();
        }

        let stack = self
            .stack
            .iter()
            .map(|(_, _, t)| t.into_serializable(constants_pool, new_offsets))
            .collect::<Result<_, _>>()?;

        Ok(SerializableFrame { locals, stack })
    }
}

impl SerializableFrame {
    /// Compute a stack map frame for this frame, given the previous frame
    ///
    /// This will fall back to the `Full` option using [`Self::full_stack_map_frame`] only if none
    /// of the other stack map frame variants are enough to encode the transition.
    pub fn stack_map_frame(&self, offset_delta: u16, previous_frame: &Self) -> StackMapFrame {
        let this_locals = &self.locals;
        let prev_locals = &previous_frame.locals;

        match self.stack.as_slice() {
            [] if this_locals.len() <= prev_locals.len() => {
                let chopped = prev_locals.len() - this_locals.len();
                if chopped < 4 && prev_locals.starts_with(this_locals) {
                    return if chopped == 0 {
                        StackMapFrame::SameLocalsNoStack { offset_delta }
                    } else {
                        StackMapFrame::ChopLocalsNoStack {
                            offset_delta,
                            chopped_k: chopped as u8,
                        }
                    };
                }
            }
            [] => {
                let appended = this_locals.len() - prev_locals.len();
                if appended < 4 && this_locals.starts_with(prev_locals) {
                    return StackMapFrame::AppendLocalsNoStack {
                        offset_delta,
                        locals: this_locals[prev_locals.len()..].to_vec(),
                    };
                }
            }
            [stack] if this_locals == prev_locals => {
                return StackMapFrame::SameLocalsOneStack {
                    offset_delta,
                    stack: *stack,
                };
            }
            _ => (),
        }

        self.full_stack_map_frame(offset_delta)
    }

    /// Compute a `Full` stack map frame
    pub fn full_stack_map_frame(&self, offset_delta: u16) -> StackMapFrame {
        StackMapFrame::Full {
            offset_delta,
            stack: self.stack.clone(),
            locals: self.locals.clone(),
        }
    }
}

fn verify_instruction(
    frame: &mut VerifierFrame,
    insn: &Insn,
    element: usize,
    this_class: &BinaryName,
) -> Result<(), VerifierErrorKind> {
    use Instruction::*;
    use VerificationType::*;

    let Frame { stack, locals } = frame;

    match insn {
        Nop => (),
        AConstNull => {
            stack.push(Null);
        }
        IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 => {
            stack.push(Integer);
        }
        LConst0 | LConst1 => {
            stack.push(Long);
        }
        FConst0 | FConst1 | FConst2 => {
            stack.push(Float);
        }
        DConst0 | DConst1 => {
            stack.push(Double);
        }
        BiPush(_) | SiPush(_) => {
            stack.push(Integer);
        }
        Ldc(constant) | Ldc2(constant) => {
            stack.push(VType::from(constant.value_type()));
        }

        ILoad(index) => load(stack, locals, *index, Integer)?,
        LLoad(index) => load(stack, locals, *index, Long)?,
        FLoad(index) => load(stack, locals, *index, Float)?,
        DLoad(index) => load(stack, locals, *index, Double)?,
        ALoad(index) => {
            let local = get_local(locals, *index)?;
            if !local.is_reference() {
                return Err(VerifierErrorKind::InvalidType);
            }
            stack.push(local);
        }

        IALoad | BALoad | CALoad | SALoad => array_load(stack, Integer)?,
        LALoad => array_load(stack, Long)?,
        FALoad => array_load(stack, Float)?,
        DALoad => array_load(stack, Double)?,
        AALoad => {
            pop_expecting(stack, Integer)?;
            let element_type = match pop(stack)? {
                Null => Null,
                Object(RefType::ObjectArray(arr)) => match arr.additional_dimensions {
                    0 => Object(RefType::Object(arr.element_type)),
                    n => Object(RefType::ObjectArray(ArrayType {
                        additional_dimensions: n - 1,
                        element_type: arr.element_type,
                    })),
                },
                _ => return Err(VerifierErrorKind::InvalidType),
            };
            stack.push(element_type);
        }

        IStore(index) => store(stack, locals, *index, Integer)?,
        LStore(index) => store(stack, locals, *index, Long)?,
        FStore(index) => store(stack, locals, *index, Float)?,
        DStore(index) => store(stack, locals, *index, Double)?,
        AStore(index) => {
            let value = pop_reference(stack)?;
            set_local(locals, *index, value);
        }

        IAStore | BAStore | CAStore | SAStore => array_store(stack, Integer)?,
        LAStore => array_store(stack, Long)?,
        FAStore => array_store(stack, Float)?,
        DAStore => array_store(stack, Double)?,
        AAStore => {
            pop_reference(stack)?;
            pop_expecting(stack, Integer)?;
            pop_reference(stack)?;
        }

        Pop => {
            pop_width(stack, 1)?;
        }

        Pop2 => {
            let arg1 = pop(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    pop_width(stack, 1)?;
                }

                // Form 2
                _ => (),
            }
        }

        Dup => {
            let arg1 = pop_width(stack, 1)?;
            stack.push(arg1.clone());
            stack.push(arg1);
        }

        DupX1 => {
            let arg1 = pop_width(stack, 1)?;
            let arg2 = pop_width(stack, 1)?;
            stack.push(arg1.clone());
            stack.push(arg2);
            stack.push(arg1);
        }

        DupX2 => {
            let arg1 = pop_width(stack, 1)?;
            let arg2 = pop(stack)?;
            match arg2.width() {
                // Form 1
                1 => {
                    let arg3 = pop_width(stack, 1)?;
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                _ => {
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }
            }
        }

        Dup2 => {
            let arg1 = pop(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg2 = pop_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                _ => {
                    stack.push(arg1.clone());
                    stack.push(arg1);
                }
            }
        }

        Dup2X1 => {
            let arg1 = pop(stack)?;
            let arg2 = pop_width(stack, 1)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg3 = pop_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                _ => {
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }
            }
        }

        Dup2X2 => {
            let arg1 = pop(stack)?;
            if arg1.width() == 1 {
                let arg2 = pop_width(stack, 1)?;
                let arg3 = pop(stack)?;
                if arg3.width() == 1 {
                    // Form 1
                    let arg4 = pop_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg4);
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                } else {
                    // Form 3
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }
            } else {
                let arg2 = pop(stack)?;
                if arg2.width() == 1 {
                    // Form 2
                    let arg3 = pop_width(stack, 1)?;
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                } else {
                    // Form 4
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }
            }
        }

        Swap => {
            let arg1 = pop_width(stack, 1)?;
            let arg2 = pop_width(stack, 1)?;
            stack.push(arg1);
            stack.push(arg2);
        }

        IAdd | ISub | IDiv | IMul | IRem | IAnd | IOr | IXor | ISh(_) => {
            binary_op(stack, Integer, Integer)?;
        }
        LAdd | LSub | LDiv | LMul | LRem | LAnd | LOr | LXor => binary_op(stack, Long, Long)?,
        FAdd | FSub | FDiv | FMul | FRem => binary_op(stack, Float, Float)?,
        DAdd | DSub | DDiv | DMul | DRem => binary_op(stack, Double, Double)?,
        LSh(_) => {
            pop_expecting(stack, Integer)?;
            pop_expecting(stack, Long)?;
            stack.push(Long);
        }

        INeg | I2B | I2C | I2S => unary_op(stack, Integer, Integer)?,
        LNeg => unary_op(stack, Long, Long)?,
        FNeg => unary_op(stack, Float, Float)?,
        DNeg => unary_op(stack, Double, Double)?,

        IInc(index, _) => {
            if get_local(locals, *index)? != Integer {
                return Err(VerifierErrorKind::InvalidType);
            }
        }

        I2L => unary_op(stack, Integer, Long)?,
        I2F => unary_op(stack, Integer, Float)?,
        I2D => unary_op(stack, Integer, Double)?,
        L2I => unary_op(stack, Long, Integer)?,
        L2F => unary_op(stack, Long, Float)?,
        L2D => unary_op(stack, Long, Double)?,
        F2I => unary_op(stack, Float, Integer)?,
        F2L => unary_op(stack, Float, Long)?,
        F2D => unary_op(stack, Float, Double)?,
        D2I => unary_op(stack, Double, Integer)?,
        D2L => unary_op(stack, Double, Long)?,
        D2F => unary_op(stack, Double, Float)?,

        LCmp => binary_op(stack, Long, Integer)?,
        FCmp(_) => binary_op(stack, Float, Integer)?,
        DCmp(_) => binary_op(stack, Double, Integer)?,

        GetStatic(field) => {
            stack.push(VType::from(field.descriptor.clone()));
        }
        PutStatic(field) => pop_field_type(stack, &field.descriptor)?,
        GetField(field) => {
            pop_reference(stack)?;
            stack.push(VType::from(field.descriptor.clone()));
        }
        PutField(field) => {
            pop_field_type(stack, &field.descriptor)?;

            // Constructors may assign fields of `this` before calling the super constructor
            pop_reference(stack)?;
        }

        Invoke(invoke_type, method) => {
            for parameter in method.descriptor.parameters.iter().rev() {
                pop_field_type(stack, parameter)?;
            }

            let is_init = method.name == UnqualifiedName::INIT;
            match invoke_type {
                InvokeType::Static => (),
                InvokeType::Special if is_init => {
                    let receiver = pop(stack)?;
                    let initialized = match &receiver {
                        UninitializedThis => Object(RefType::Object(this_class.clone())),
                        Uninitialized(uninitialized) => {
                            Object(RefType::Object(uninitialized.class.clone()))
                        }
                        _ => return Err(VerifierErrorKind::InvalidType),
                    };
                    replace_all_on_stack(stack, &receiver, &initialized);
                    for local in locals.iter_mut() {
                        if *local == receiver {
                            *local = initialized.clone();
                        }
                    }
                }
                _ => {
                    pop_reference(stack)?;
                }
            }

            if let Some(return_type) = &method.descriptor.return_type {
                stack.push(VType::from(return_type.clone()));
            }
        }

        InvokeDynamic(call_site) => {
            for parameter in call_site.descriptor.parameters.iter().rev() {
                pop_field_type(stack, parameter)?;
            }
            if let Some(return_type) = &call_site.descriptor.return_type {
                stack.push(VType::from(return_type.clone()));
            }
        }

        New(RefType::Object(class)) => {
            stack.push(Uninitialized(UninitializedRef {
                class: class.clone(),
                element,
            }));
        }
        New(_) => return Err(VerifierErrorKind::InvalidType),
        NewArray(base_type) => {
            pop_expecting(stack, Integer)?;
            stack.push(Object(RefType::array(FieldType::Base(*base_type))));
        }
        ANewArray(ref_type) => {
            pop_expecting(stack, Integer)?;
            stack.push(Object(RefType::array(FieldType::Ref(ref_type.clone()))));
        }
        MultiANewArray(ref_type, dimensions) => {
            for _ in 0..*dimensions {
                pop_expecting(stack, Integer)?;
            }
            stack.push(Object(ref_type.clone()));
        }
        ArrayLength => {
            pop_reference(stack)?;
            stack.push(Integer);
        }

        CheckCast(ref_type) => {
            pop_reference(stack)?;
            stack.push(Object(ref_type.clone()));
        }
        InstanceOf(_) => {
            pop_reference(stack)?;
            stack.push(Integer);
        }
        MonitorEnter | MonitorExit => {
            pop_reference(stack)?;
        }
    }

    Ok(())
}

fn verify_branch_instruction<Lbl, LblWide>(
    frame: &mut VerifierFrame,
    insn: &BranchInstruction<Lbl, LblWide>,
    return_type: Option<&FieldType<BinaryName>>,
) -> Result<(), VerifierErrorKind> {
    use BranchInstruction::*;
    use VerificationType::*;

    let stack = &mut frame.stack;
    match insn {
        If(_, _) => pop_expecting(stack, Integer)?,
        IfICmp(_, _) => {
            pop_expecting(stack, Integer)?;
            pop_expecting(stack, Integer)?;
        }
        IfACmp(_, _) => {
            pop_reference(stack)?;
            pop_reference(stack)?;
        }
        IfNull(_, _) => {
            pop_reference(stack)?;
        }
        Goto(_) | GotoW(_) => (),
        TableSwitch { .. } | LookupSwitch { .. } => pop_expecting(stack, Integer)?,
        IReturn => {
            pop_expecting(stack, Integer)?;
            match return_type {
                Some(FieldType::Base(
                    BaseType::Int
                    | BaseType::Char
                    | BaseType::Short
                    | BaseType::Byte
                    | BaseType::Boolean,
                )) => (),
                _ => return Err(VerifierErrorKind::InvalidType),
            }
        }
        LReturn => return_value(stack, Long, return_type)?,
        FReturn => return_value(stack, Float, return_type)?,
        DReturn => return_value(stack, Double, return_type)?,
        AReturn => {
            pop_reference(stack)?;
            if !matches!(return_type, Some(FieldType::Ref(_))) {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        Return => {
            if return_type.is_some() {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        AThrow => {
            let exception = pop_reference(stack)?;
            stack.clear();
            stack.push(exception);
        }
    }

    Ok(())
}

fn return_value(
    stack: &mut OffsetVec<VType>,
    expected: VType,
    return_type: Option<&FieldType<BinaryName>>,
) -> Result<(), VerifierErrorKind> {
    pop_expecting(stack, expected.clone())?;
    match return_type {
        Some(return_type) if VType::from(return_type.clone()) == expected => Ok(()),
        _ => Err(VerifierErrorKind::InvalidType),
    }
}

fn replace_all_on_stack(stack: &mut OffsetVec<VType>, original: &VType, updated: &VType) {
    let mut replaced: OffsetVec<VType> = std::mem::take(stack)
        .into_iter()
        .map(|(_, _, ty)| if ty == *original { updated.clone() } else { ty })
        .collect();
    std::mem::swap(stack, &mut replaced);
}

fn get_local(locals: &[VType], index: u16) -> Result<VType, VerifierErrorKind> {
    locals
        .get(index as usize)
        .cloned()
        .ok_or(VerifierErrorKind::InvalidIndex)
}

/// Write a local, invalidating any `long` or `double` that gets partially overwritten
fn set_local(locals: &mut Vec<VType>, index: u16, value: VType) {
    let index = index as usize;
    let width = value.width();
    if locals.len() < index + width {
        locals.resize(index + width, VerificationType::Top);
    }
    if index > 0 && locals[index - 1].width() == 2 {
        locals[index - 1] = VerificationType::Top;
    }
    if locals[index].width() == 2 && width == 1 && index + 1 < locals.len() {
        locals[index + 1] = VerificationType::Top;
    }
    locals[index] = value;
    if width == 2 {
        locals[index + 1] = VerificationType::Top;
    }
}

fn load(
    stack: &mut OffsetVec<VType>,
    locals: &[VType],
    index: u16,
    expected: VType,
) -> Result<(), VerifierErrorKind> {
    if get_local(locals, index)? != expected {
        return Err(VerifierErrorKind::InvalidType);
    }
    stack.push(expected);
    Ok(())
}

fn store(
    stack: &mut OffsetVec<VType>,
    locals: &mut Vec<VType>,
    index: u16,
    expected: VType,
) -> Result<(), VerifierErrorKind> {
    pop_expecting(stack, expected.clone())?;
    set_local(locals, index, expected);
    Ok(())
}

fn array_load(stack: &mut OffsetVec<VType>, element: VType) -> Result<(), VerifierErrorKind> {
    pop_expecting(stack, VerificationType::Integer)?;
    pop_reference(stack)?;
    stack.push(element);
    Ok(())
}

fn array_store(stack: &mut OffsetVec<VType>, element: VType) -> Result<(), VerifierErrorKind> {
    pop_expecting(stack, element)?;
    pop_expecting(stack, VerificationType::Integer)?;
    pop_reference(stack)?;
    Ok(())
}

fn unary_op(
    stack: &mut OffsetVec<VType>,
    argument: VType,
    result: VType,
) -> Result<(), VerifierErrorKind> {
    pop_expecting(stack, argument)?;
    stack.push(result);
    Ok(())
}

fn binary_op(
    stack: &mut OffsetVec<VType>,
    arguments: VType,
    result: VType,
) -> Result<(), VerifierErrorKind> {
    pop_expecting(stack, arguments.clone())?;
    pop_expecting(stack, arguments)?;
    stack.push(result);
    Ok(())
}

fn pop(stack: &mut OffsetVec<VType>) -> Result<VType, VerifierErrorKind> {
    stack
        .pop()
        .map(|(_, _, typ)| typ)
        .ok_or(VerifierErrorKind::EmptyStack)
}

fn pop_width(stack: &mut OffsetVec<VType>, expected_width: usize) -> Result<VType, VerifierErrorKind> {
    let typ = pop(stack)?;
    let found_width = typ.width();
    if found_width == expected_width {
        Ok(typ)
    } else {
        Err(VerifierErrorKind::InvalidWidth(found_width))
    }
}

fn pop_expecting(stack: &mut OffsetVec<VType>, expected_type: VType) -> Result<(), VerifierErrorKind> {
    if pop(stack)? == expected_type {
        Ok(())
    } else {
        Err(VerifierErrorKind::InvalidType)
    }
}

/// Pop any reference
///
/// Reference types are not checked for assignability, only that they are references at all.
fn pop_reference(stack: &mut OffsetVec<VType>) -> Result<VType, VerifierErrorKind> {
    let typ = pop(stack)?;
    if typ.is_reference() {
        Ok(typ)
    } else {
        Err(VerifierErrorKind::InvalidType)
    }
}

fn pop_field_type(
    stack: &mut OffsetVec<VType>,
    expected: &FieldType<BinaryName>,
) -> Result<(), VerifierErrorKind> {
    match expected {
        FieldType::Ref(_) => pop_reference(stack).map(|_| ()),
        FieldType::Base(_) => pop_expecting(stack, VType::from(expected.clone())),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::MethodRef;
    use crate::jvm::Name;
    use VerificationType::*;

    fn new_frame<const N: usize, const M: usize>(locals: [VType; N], stack: [VType; M]) -> VerifierFrame {
        Frame {
            locals: Vec::from(locals),
            stack: OffsetVec::from_iter(stack),
        }
    }

    fn my_class() -> BinaryName {
        BinaryName::from_string(String::from("org/example/MyClass")).unwrap()
    }

    #[test]
    fn arithmetic() {
        let binops = [
            (Integer, vec![Instruction::IAdd, Instruction::ISub, Instruction::IDiv, Instruction::IMul, Instruction::IRem, Instruction::IAnd, Instruction::IOr, Instruction::IXor]),
            (Long, vec![Instruction::LAdd, Instruction::LSub, Instruction::LDiv, Instruction::LMul, Instruction::LRem, Instruction::LAnd, Instruction::LOr, Instruction::LXor]),
            (Float, vec![Instruction::FAdd, Instruction::FSub, Instruction::FDiv, Instruction::FMul, Instruction::FRem]),
            (Double, vec![Instruction::DAdd, Instruction::DSub, Instruction::DDiv, Instruction::DMul, Instruction::DRem]),
        ];

        for (good_typ, instructions) in binops {
            for instruction in instructions {
                // Try a bunch of different types
                for typ in [Integer, Long, Float, Double, Null, UninitializedThis] {
                    let mut frame_in = new_frame([], [typ.clone(), typ.clone()]);
                    let result = frame_in.verify_instruction(&instruction, 0, &my_class());
                    if typ == good_typ {
                        assert!(result.is_ok(), "Verification of {:?}", instruction);
                        assert_eq!(frame_in, new_frame([], [typ]), "Output frame of {:?}", instruction);
                    } else {
                        assert_eq!(result, Err(VerifierErrorKind::InvalidType), "Verification of {:?}", instruction);
                    }
                }

                // Try with a stack that is too small
                let mut frame_in = new_frame([], [good_typ.clone()]);
                assert_eq!(
                    frame_in.verify_instruction(&instruction, 0, &my_class()),
                    Err(VerifierErrorKind::EmptyStack),
                    "Verification of {:?}",
                    instruction
                );
            }
        }
    }

    #[test]
    fn wide_locals() {
        let mut frame = new_frame([Integer, Integer, Integer], [Long]);
        frame.verify_instruction(&Instruction::LStore(1), 0, &my_class()).unwrap();
        assert_eq!(frame.locals, vec![Integer, Long, Top]);

        // Overwriting the second half of the `long` kills it
        frame.stack.push(Integer);
        frame.verify_instruction(&Instruction::IStore(2), 1, &my_class()).unwrap();
        assert_eq!(frame.locals, vec![Integer, Top, Integer]);
        assert_eq!(
            frame.verify_instruction(&Instruction::LLoad(1), 2, &my_class()),
            Err(VerifierErrorKind::InvalidType)
        );
        assert_eq!(
            frame.verify_instruction(&Instruction::ILoad(7), 3, &my_class()),
            Err(VerifierErrorKind::InvalidIndex)
        );
    }

    #[test]
    fn constructor_initialization() {
        let object = BinaryName::OBJECT;
        let init = MethodRef::new(
            object.clone(),
            UnqualifiedName::INIT,
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            false,
        );

        // `this` gets initialized in place
        let mut frame = VerifierFrame::method_entry(
            &my_class(),
            &UnqualifiedName::INIT,
            &MethodDescriptor {
                parameters: vec![FieldType::long()],
                return_type: None,
            },
            false,
        );
        assert_eq!(frame.locals, vec![UninitializedThis, Long, Top]);
        frame.verify_instruction(&Instruction::ALoad(0), 0, &my_class()).unwrap();
        frame
            .verify_instruction(&Instruction::Invoke(InvokeType::Special, init.clone()), 1, &my_class())
            .unwrap();
        assert_eq!(frame.locals[0], Object(RefType::Object(my_class())));

        // Fresh objects get initialized everywhere they have been duplicated
        let mut frame = new_frame([], []);
        frame
            .verify_instruction(&Instruction::New(RefType::Object(object.clone())), 4, &my_class())
            .unwrap();
        frame.verify_instruction(&Instruction::Dup, 5, &my_class()).unwrap();
        frame
            .verify_instruction(&Instruction::Invoke(InvokeType::Special, init), 6, &my_class())
            .unwrap();
        assert_eq!(frame, new_frame([], [Object(RefType::Object(object))]));
    }

    #[test]
    fn compact_stack_map_frames() {
        let full = SerializableFrame {
            locals: vec![Integer, Long],
            stack: vec![],
        };
        let fewer = SerializableFrame {
            locals: vec![Integer],
            stack: vec![],
        };
        let one_stack = SerializableFrame {
            locals: vec![Integer],
            stack: vec![Float],
        };
        assert_eq!(
            full.stack_map_frame(3, &full),
            StackMapFrame::SameLocalsNoStack { offset_delta: 3 }
        );
        assert_eq!(
            fewer.stack_map_frame(3, &full),
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 3,
                chopped_k: 1
            }
        );
        assert_eq!(
            full.stack_map_frame(3, &fewer),
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 3,
                locals: vec![Long]
            }
        );
        assert_eq!(
            one_stack.stack_map_frame(3, &fewer),
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 3,
                stack: Float
            }
        );
        assert!(matches!(
            one_stack.stack_map_frame(3, &full),
            StackMapFrame::Full { .. }
        ));
    }
}
