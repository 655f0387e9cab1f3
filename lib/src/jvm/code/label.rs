use std::fmt;

/// Position in a method body, placed with [`super::MethodBody::place_label`]
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SynLabel(usize);

impl SynLabel {
    pub const START: SynLabel = SynLabel(0);
}

impl fmt::Debug for SynLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

/// Source of labels which are distinct from each other
///
/// Clones continue the same sequence, so labels only stay distinct if a single generator is used
/// per method body.
#[derive(Clone, Debug, Default)]
pub struct SynLabelGenerator {
    next: usize,
}

impl SynLabelGenerator {
    pub fn fresh_label(&mut self) -> SynLabel {
        let label = SynLabel(self.next);
        self.next += 1;
        label
    }
}
