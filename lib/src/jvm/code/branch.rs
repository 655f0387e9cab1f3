use crate::jvm::class_file::Serialize;
use crate::util::Width;
use byteorder::WriteBytesExt;
use std::io::Result;
use std::ops::Not;

/// Branching JVM bytecode instruction
///
/// The type parameters abstract over the representation of
///
///   * __regular jump targets__: used in almost all branch instructions
///   * __wide jump targets__: used only in `goto_w` and the switches
///
/// While a method body is being rewritten, both are symbolic labels. Shortly before the final
/// serialization step, regular targets become signed 16-bit offsets and wide targets become
/// signed 32-bit offsets, both relative to the start of the branch instruction.
///
/// Conditional branches fall through to whatever comes next in the method body.
#[derive(Clone, Debug)]
pub enum BranchInstruction<Lbl, LblWide> {
    If(OrdComparison, Lbl),     // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Lbl), // covers `if_icmpeq`, `if_icmpne`, ... `if_icmple`
    IfACmp(EqComparison, Lbl),  // covers `if_acmpeq`, `if_acmpne`
    Goto(Lbl),
    GotoW(LblWide),
    TableSwitch {
        /// `default` must be at a multiple of four bytes from the start of the current method, so
        /// there must be a 0-3 inclusive byte padding
        padding: u8,

        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: LblWide,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<LblWide>,
    },
    LookupSwitch {
        /// Same alignment constraint as for `TableSwitch`
        padding: u8,

        /// Jump target if there is no corresponding key
        default: LblWide,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, LblWide)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,
    IfNull(EqComparison, Lbl), // covers `ifnull`, `ifnonnull`
}

impl<Lbl, LblWide> BranchInstruction<Lbl, LblWide> {
    /// Can control reach the next element of the body?
    pub fn falls_through(&self) -> bool {
        matches!(
            self,
            BranchInstruction::If(_, _)
                | BranchInstruction::IfICmp(_, _)
                | BranchInstruction::IfACmp(_, _)
                | BranchInstruction::IfNull(_, _)
        )
    }

    /// Returns from the method or throws
    pub fn exits(&self) -> bool {
        matches!(
            self,
            BranchInstruction::IReturn
                | BranchInstruction::LReturn
                | BranchInstruction::FReturn
                | BranchInstruction::DReturn
                | BranchInstruction::AReturn
                | BranchInstruction::Return
                | BranchInstruction::AThrow
        )
    }

    pub fn map_labels<Lbl2, LblWide2>(
        &self,
        map_label: impl FnOnce(&Lbl) -> Lbl2,
        map_wide_label: impl Fn(&LblWide) -> LblWide2,
    ) -> BranchInstruction<Lbl2, LblWide2> {
        use BranchInstruction::*;

        match self {
            If(op, lbl) => If(*op, map_label(lbl)),
            IfICmp(op, lbl) => IfICmp(*op, map_label(lbl)),
            IfACmp(op, lbl) => IfACmp(*op, map_label(lbl)),
            Goto(lbl) => Goto(map_label(lbl)),
            GotoW(wide) => GotoW(map_wide_label(wide)),
            TableSwitch {
                padding,
                default,
                low,
                targets,
            } => TableSwitch {
                padding: *padding,
                default: map_wide_label(default),
                low: *low,
                targets: targets.iter().map(map_wide_label).collect(),
            },
            LookupSwitch {
                padding,
                default,
                targets,
            } => LookupSwitch {
                padding: *padding,
                default: map_wide_label(default),
                targets: targets
                    .iter()
                    .map(|(key, lbl)| (*key, map_wide_label(lbl)))
                    .collect(),
            },
            IReturn => IReturn,
            LReturn => LReturn,
            FReturn => FReturn,
            DReturn => DReturn,
            AReturn => AReturn,
            Return => Return,
            AThrow => AThrow,
            IfNull(op, lbl) => IfNull(*op, map_label(lbl)),
        }
    }
}

impl<Lbl: Copy, LblWide: Copy> BranchInstruction<Lbl, LblWide> {
    /// Targets of the instruction, other than falling through
    pub fn jump_targets(&self) -> JumpTargets<Lbl, LblWide> {
        match self {
            BranchInstruction::If(_, lbl)
            | BranchInstruction::IfICmp(_, lbl)
            | BranchInstruction::IfACmp(_, lbl)
            | BranchInstruction::IfNull(_, lbl)
            | BranchInstruction::Goto(lbl) => JumpTargets::Regular(*lbl),
            BranchInstruction::GotoW(lbl_w) => JumpTargets::Wide(*lbl_w),
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().copied());
                JumpTargets::WideMany(ts)
            }
            BranchInstruction::LookupSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().map(|(_, target)| *target));
                JumpTargets::WideMany(ts)
            }
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => JumpTargets::None,
        }
    }
}

impl<Lbl, LblWide> Width for BranchInstruction<Lbl, LblWide> {
    fn width(&self) -> usize {
        match self {
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => 1,

            BranchInstruction::Goto(_)
            | BranchInstruction::If(_, _)
            | BranchInstruction::IfICmp(_, _)
            | BranchInstruction::IfACmp(_, _)
            | BranchInstruction::IfNull(_, _) => 3,

            BranchInstruction::GotoW(_) => 5,

            BranchInstruction::TableSwitch {
                padding, targets, ..
            } => 1 + *padding as usize + 4 * (3 + targets.len()),

            BranchInstruction::LookupSwitch {
                padding, targets, ..
            } => 1 + *padding as usize + 8 * (1 + targets.len()),
        }
    }
}

impl Serialize for BranchInstruction<i16, i32> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        match self {
            BranchInstruction::If(comp, lbl) => {
                let opcode: u8 = match comp {
                    OrdComparison::EQ => 0x99,
                    OrdComparison::NE => 0x9a,
                    OrdComparison::LT => 0x9b,
                    OrdComparison::GE => 0x9c,
                    OrdComparison::GT => 0x9d,
                    OrdComparison::LE => 0x9e,
                };
                opcode.serialize(writer)?;
                lbl.serialize(writer)?;
            }
            BranchInstruction::IfICmp(comp, lbl) => {
                let opcode: u8 = match comp {
                    OrdComparison::EQ => 0x9f,
                    OrdComparison::NE => 0xa0,
                    OrdComparison::LT => 0xa1,
                    OrdComparison::GE => 0xa2,
                    OrdComparison::GT => 0xa3,
                    OrdComparison::LE => 0xa4,
                };
                opcode.serialize(writer)?;
                lbl.serialize(writer)?;
            }
            BranchInstruction::IfACmp(comp, lbl) => {
                let opcode: u8 = match comp {
                    EqComparison::EQ => 0xa5,
                    EqComparison::NE => 0xa6,
                };
                opcode.serialize(writer)?;
                lbl.serialize(writer)?;
            }
            BranchInstruction::Goto(lbl) => {
                0xa7u8.serialize(writer)?;
                lbl.serialize(writer)?;
            }
            BranchInstruction::GotoW(lbl_ext) => {
                0xc8u8.serialize(writer)?;
                lbl_ext.serialize(writer)?;
            }
            BranchInstruction::TableSwitch {
                padding,
                default,
                low,
                targets,
            } => {
                0xaau8.serialize(writer)?;
                for _ in 0..*padding {
                    0x00u8.serialize(writer)?;
                }
                default.serialize(writer)?;
                low.serialize(writer)?;
                (low + targets.len() as i32 - 1).serialize(writer)?;
                for target in targets {
                    target.serialize(writer)?;
                }
            }
            BranchInstruction::LookupSwitch {
                padding,
                default,
                targets,
            } => {
                0xabu8.serialize(writer)?;
                for _ in 0..*padding {
                    0x00u8.serialize(writer)?;
                }
                default.serialize(writer)?;
                (targets.len() as i32).serialize(writer)?;
                for (key, target) in targets {
                    key.serialize(writer)?;
                    target.serialize(writer)?;
                }
            }
            BranchInstruction::IReturn => 0xacu8.serialize(writer)?,
            BranchInstruction::LReturn => 0xadu8.serialize(writer)?,
            BranchInstruction::FReturn => 0xaeu8.serialize(writer)?,
            BranchInstruction::DReturn => 0xafu8.serialize(writer)?,
            BranchInstruction::AReturn => 0xb0u8.serialize(writer)?,
            BranchInstruction::Return => 0xb1u8.serialize(writer)?,
            BranchInstruction::AThrow => 0xbfu8.serialize(writer)?,
            BranchInstruction::IfNull(comp, lbl) => {
                let opcode: u8 = match comp {
                    EqComparison::EQ => 0xc6,
                    EqComparison::NE => 0xc7,
                };
                opcode.serialize(writer)?;
                lbl.serialize(writer)?;
            }
        }
        Ok(())
    }
}

/// Non-fallthrough jump targets of a `BranchInstruction`
pub enum JumpTargets<Lbl, LblWide> {
    None,
    Regular(Lbl),
    Wide(LblWide),
    WideMany(Vec<LblWide>),
}

impl<A> JumpTargets<A, A> {
    /// If all targets are the same type, extract them
    pub fn targets(&self) -> &[A] {
        match self {
            JumpTargets::None => &[],
            JumpTargets::Regular(a) => std::slice::from_ref(a),
            JumpTargets::Wide(a) => std::slice::from_ref(a),
            JumpTargets::WideMany(a_many) => a_many,
        }
    }
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn switch_layout() {
        let switch: BranchInstruction<i16, i32> = BranchInstruction::TableSwitch {
            padding: 2,
            default: 20,
            low: 5,
            targets: vec![8, 12],
        };
        let mut bytes = vec![];
        switch.serialize(&mut bytes).unwrap();
        assert_eq!(bytes.len(), switch.width());
        assert_eq!(
            bytes,
            vec![0xaa, 0, 0, 0, 0, 0, 20, 0, 0, 0, 5, 0, 0, 0, 6, 0, 0, 0, 8, 0, 0, 0, 12]
        );
    }

    #[test]
    fn control_flow_shape() {
        let branch: BranchInstruction<u32, u32> = BranchInstruction::IfNull(EqComparison::NE, 4);
        assert!(branch.falls_through());
        assert_eq!(branch.jump_targets().targets(), &[4]);

        let ret: BranchInstruction<u32, u32> = BranchInstruction::AReturn;
        assert!(!ret.falls_through());
        assert!(ret.exits());
        assert!(ret.jump_targets().targets().is_empty());

        assert_eq!(!OrdComparison::LT, OrdComparison::GE);
    }
}
