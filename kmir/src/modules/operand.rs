//! Shared operand types for instructions.
//!
//! An instruction operand can be a reference to another SSA value (`Reg`),
//! an immediate integer (`Imm`), the null pointer, or a direct reference to
//! a module-level symbol (function, declaration or global).
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::EnumIs;
use uuid::Uuid;

use crate::modules::symbol::FunctionPointer;

/// SSA value identifier used to name the destination or reference another
/// instruction's result.
pub type Name = u32;

/// Represents a code label used as a target for control-flow terminators.
///
/// Labels and control-flow may not cross function boundaries. Thus, labels
/// are only valid within the function they are defined in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Label(pub u32);

impl Label {
    pub const NIL: Label = Label(0);

    /// Returns true if this is the "nil" label (i.e., label 0).
    ///
    /// This label is reserved as the 'function entry' label. It should always be present.
    pub fn is_nil(&self) -> bool {
        self == &Label::NIL
    }
}

/// Instruction operand.
#[derive(Clone, Debug, PartialEq, Eq, Hash, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Operand {
    /// Reference to a previously defined SSA value.
    Reg(Name),
    /// Immediate integer literal.
    Imm(i64),
    /// The null pointer.
    Null,
    /// Direct reference to a function symbol (defined or declared).
    Func(FunctionPointer),
    /// Direct reference to a global variable.
    Global(Uuid),
}

impl Operand {
    /// Returns the referenced function symbol, if any.
    pub fn as_function(&self) -> Option<&FunctionPointer> {
        match self {
            Operand::Func(ptr) => Some(ptr),
            _ => None,
        }
    }
}
