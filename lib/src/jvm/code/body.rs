use crate::jvm::code::{BranchInstruction, Insn, SynLabel, SynLabelGenerator};
use crate::jvm::{BinaryName, FieldType, UnqualifiedName};

/// Element of a method body
///
/// A body is a flat sequence of these, in the order the code is laid out. Labels and line
/// numbers take up no space in the encoded bytecode.
#[derive(Clone, Debug)]
pub enum CodeElement {
    /// Position that can be jumped to or referenced from the exception table
    Label(SynLabel),

    /// Source line number of the instructions that follow
    Line(u16),

    Instruction(Insn),

    Branch(BranchInstruction<SynLabel, SynLabel>),
}

/// Entry in the exception table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TryCatch {
    /// Start of the protected range (inclusive)
    pub start: SynLabel,

    /// End of the protected range (exclusive)
    pub end: SynLabel,

    pub handler: SynLabel,

    /// `None` catches everything
    pub catch_type: Option<BinaryName>,
}

/// Entry in the local variable debug table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
    pub index: u16,
    pub start: SynLabel,
    pub end: SynLabel,
}

/// Symbolic representation of the `Code` attribute of a method
///
/// Jumps refer to [`SynLabel`]s instead of offsets, and constants are stored by value rather than
/// by constant pool index. This makes it possible to freely splice and reorder code before it gets
/// encoded back into bytecode (with freshly computed offsets, stack map frames, and maximums).
#[derive(Clone, Debug, Default)]
pub struct MethodBody {
    /// Locals declared by the original code (the encoder never goes below this)
    pub max_locals: u16,

    pub elements: Vec<CodeElement>,
    pub try_catches: Vec<TryCatch>,
    pub local_variables: Vec<LocalVariableEntry>,
    pub labels: SynLabelGenerator,
}

impl MethodBody {
    pub fn new() -> MethodBody {
        MethodBody::default()
    }

    pub fn fresh_label(&mut self) -> SynLabel {
        self.labels.fresh_label()
    }

    pub fn push(&mut self, insn: Insn) {
        self.elements.push(CodeElement::Instruction(insn));
    }

    pub fn push_branch(&mut self, branch: BranchInstruction<SynLabel, SynLabel>) {
        self.elements.push(CodeElement::Branch(branch));
    }

    pub fn place_label(&mut self, label: SynLabel) {
        self.elements.push(CodeElement::Label(label));
    }

    /// Return from the method, choosing the instruction based on the return type
    pub fn push_return(&mut self, return_type: Option<&FieldType<BinaryName>>) {
        self.push_branch(return_branch(return_type));
    }

    /// Number of real instructions (not counting labels and line numbers)
    pub fn instruction_count(&self) -> usize {
        self.elements
            .iter()
            .filter(|elem| matches!(elem, CodeElement::Instruction(_) | CodeElement::Branch(_)))
            .count()
    }

    /// Iterate over the straight-line instructions
    pub fn instructions(&self) -> impl Iterator<Item = &Insn> {
        self.elements.iter().filter_map(|elem| match elem {
            CodeElement::Instruction(insn) => Some(insn),
            _ => None,
        })
    }

    /// Rename every class mentioned in the body
    pub fn map_classes(&mut self, rename: &impl Fn(&BinaryName) -> BinaryName) {
        for element in &mut self.elements {
            if let CodeElement::Instruction(insn) = element {
                *insn = insn.map_classes(rename);
            }
        }
        for try_catch in &mut self.try_catches {
            if let Some(catch_type) = &try_catch.catch_type {
                try_catch.catch_type = Some(rename(catch_type));
            }
        }
        for local in &mut self.local_variables {
            local.descriptor = local.descriptor.map_classes(rename);
        }
    }
}

/// Return instruction matching a method return type
pub fn return_branch<Lbl, LblWide>(
    return_type: Option<&FieldType<BinaryName>>,
) -> BranchInstruction<Lbl, LblWide> {
    use crate::jvm::BaseType;

    match return_type {
        None => BranchInstruction::Return,
        Some(FieldType::Base(BaseType::Long)) => BranchInstruction::LReturn,
        Some(FieldType::Base(BaseType::Float)) => BranchInstruction::FReturn,
        Some(FieldType::Base(BaseType::Double)) => BranchInstruction::DReturn,
        Some(FieldType::Base(_)) => BranchInstruction::IReturn,
        Some(FieldType::Ref(_)) => BranchInstruction::AReturn,
    }
}
