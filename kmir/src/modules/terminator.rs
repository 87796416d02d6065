//! Control flow terminators.
//!
//! Every basic block ends with exactly one terminator deciding where control
//! goes next.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::EnumIs;

use crate::modules::operand::{Label, Operand};

/// Unconditional jump instruction
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Jump {
    /// The label to jump to.
    pub target: Label,
}

/// Conditional branch instruction
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CBranch {
    /// The condition operand; control transfers to `target_true` when it is
    /// non-zero and to `target_false` otherwise.
    pub cond: Operand,
    pub target_true: Label,
    pub target_false: Label,
}

/// Return from function instruction. Optionally returns a value.
///
/// If `value` is `None`, it indicates a `void` return.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ret {
    pub value: Option<Operand>,
}

/// Control flow terminator instructions
#[derive(Debug, Clone, Hash, PartialEq, Eq, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Terminator {
    Jump(Jump),
    CBranch(CBranch),
    Ret(Ret),
    Unreachable,
}

impl Terminator {
    /// Iterate over the operands read by this terminator.
    pub fn operands(&self) -> impl Iterator<Item = &Operand> {
        let operand = match self {
            Terminator::CBranch(cbranch) => Some(&cbranch.cond),
            Terminator::Ret(ret) => ret.value.as_ref(),
            Terminator::Jump(_) | Terminator::Unreachable => None,
        };
        operand.into_iter()
    }

    /// Labels this terminator may transfer control to.
    pub fn successors(&self) -> impl Iterator<Item = Label> {
        let targets = match self {
            Terminator::Jump(jump) => [Some(jump.target), None],
            Terminator::CBranch(cbranch) => [Some(cbranch.target_true), Some(cbranch.target_false)],
            Terminator::Ret(_) | Terminator::Unreachable => [None, None],
        };
        targets.into_iter().flatten()
    }
}
