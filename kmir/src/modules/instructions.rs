use bitflags::bitflags;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::{Display, EnumDiscriminants, EnumIs, EnumIter, EnumString, IntoStaticStr};

use crate::{
    modules::{
        operand::{Name, Operand},
        symbol::FunctionPointer,
    },
    types::Type,
};

bitflags! {
    /// Flags providing additional information about instructions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InstructionFlags: u32 {
        /// Instruction has no side-effects besides producing its result.
        const SIMPLE = 1 << 0;

        /// This instruction is *potentially* affecting or accessing memory state. This
        /// regroups loads, stores, and function calls.
        const MEMORY = 1 << 1;

        /// Instruction transfers control to another function.
        const CALL = 1 << 2;
    }
}

/// Common interface implemented by every instruction node.
///
/// This trait provides lightweight, zero-allocation iteration over an
/// instruction's input operands and exposes its optional destination SSA
/// name when present.
pub trait Instruction {
    fn flags(&self) -> InstructionFlags;

    /// Iterate over all input operands for this instruction.
    fn operands(&self) -> impl Iterator<Item = &Operand>;

    /// Mutably iterate over all input operands for this instruction.
    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand>;

    /// Return the destination SSA name if the instruction produces a result.
    fn destination(&self) -> Option<Name> {
        None
    }

    /// Type of the destination SSA name if the instruction produces a result.
    fn destination_type(&self) -> Option<Type> {
        None
    }

    /// Convenience iterator over referenced SSA names (i.e., register
    /// operands). Immediates and symbols are ignored.
    fn dependencies(&self) -> impl Iterator<Item = Name> {
        self.operands().filter_map(|op| match op {
            Operand::Reg(reg) => Some(*reg),
            _ => None,
        })
    }

    /// Iterate over the function symbols referenced by this instruction.
    fn referenced_functions(&self) -> impl Iterator<Item = FunctionPointer> {
        self.operands().filter_map(|op| op.as_function().copied())
    }
}

/// Function call instruction
///
/// Functions cannot raise exceptions; control always resumes after the call.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Invoke {
    /// Should be a reference to a function pointer (either internal or external). We
    /// describe it as an `Operand` to allow indirect calls through registers.
    pub function: Operand,

    /// The argument operands to pass to the function.
    pub args: SmallVec<Operand, 4>,

    /// The destination SSA name for the return value, if any.
    pub dest: Option<Name>,

    /// The return type of the function being called. `None` for `void` functions.
    pub ty: Option<Type>,
}

impl Invoke {
    /// The statically known callee, `None` for indirect calls.
    pub fn callee(&self) -> Option<FunctionPointer> {
        self.function.as_function().copied()
    }
}

impl Instruction for Invoke {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::MEMORY | InstructionFlags::CALL
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        std::iter::once(&self.function).chain(self.args.iter())
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        std::iter::once(&mut self.function).chain(self.args.iter_mut())
    }

    fn destination(&self) -> Option<Name> {
        self.dest
    }

    fn destination_type(&self) -> Option<Type> {
        self.ty
    }
}

/// Integer binary operation kind.
#[derive(
    Debug, Clone, Copy, Hash, PartialEq, Eq, Display, EnumString, IntoStaticStr, EnumIter,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IBinaryOp {
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "sub")]
    Sub,
    #[strum(serialize = "mul")]
    Mul,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "xor")]
    Xor,
}

/// Integer binary operation (wrapping semantics).
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IBinary {
    pub dest: Name,
    pub ty: Type,
    pub op: IBinaryOp,
    pub lhs: Operand,
    pub rhs: Operand,
}

impl Instruction for IBinary {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::SIMPLE
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        [&self.lhs, &self.rhs].into_iter()
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        [&mut self.lhs, &mut self.rhs].into_iter()
    }

    fn destination(&self) -> Option<Name> {
        Some(self.dest)
    }

    fn destination_type(&self) -> Option<Type> {
        Some(self.ty)
    }
}

/// Load a value of type `ty` from `addr`.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MLoad {
    pub dest: Name,
    pub ty: Type,
    pub addr: Operand,
}

impl Instruction for MLoad {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::MEMORY
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        std::iter::once(&self.addr)
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        std::iter::once(&mut self.addr)
    }

    fn destination(&self) -> Option<Name> {
        Some(self.dest)
    }

    fn destination_type(&self) -> Option<Type> {
        Some(self.ty)
    }
}

/// Store `value` at `addr`.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MStore {
    pub addr: Operand,
    pub value: Operand,
}

impl Instruction for MStore {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::MEMORY
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        [&self.value, &self.addr].into_iter()
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        [&mut self.value, &mut self.addr].into_iter()
    }
}

/// Discriminated union covering all public instruction kinds.
///
/// Use this enum to store heterogeneous instruction streams and to pattern-match
/// on specific operations. The generated `KmInstrOp` discriminant (via
/// `strum`) can be helpful for fast classification.
#[derive(Debug, Clone, Hash, PartialEq, Eq, EnumIs, EnumDiscriminants)]
#[strum_discriminants(name(KmInstrOp), derive(EnumIter))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum KmInstr {
    Invoke(Invoke),
    IBinary(IBinary),
    MLoad(MLoad),
    MStore(MStore),
}

impl KmInstr {
    /// Returns the call instruction if this is one.
    pub fn as_invoke(&self) -> Option<&Invoke> {
        match self {
            KmInstr::Invoke(invoke) => Some(invoke),
            _ => None,
        }
    }
}

macro_rules! dispatch {
    ($self:expr, $instr:ident => $body:expr) => {
        match $self {
            KmInstr::Invoke($instr) => $body,
            KmInstr::IBinary($instr) => $body,
            KmInstr::MLoad($instr) => $body,
            KmInstr::MStore($instr) => $body,
        }
    };
}

impl Instruction for KmInstr {
    fn flags(&self) -> InstructionFlags {
        dispatch!(self, instr => instr.flags())
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        let operands: Box<dyn Iterator<Item = &Operand> + '_> = match self {
            KmInstr::Invoke(instr) => Box::new(instr.operands()),
            KmInstr::IBinary(instr) => Box::new(instr.operands()),
            KmInstr::MLoad(instr) => Box::new(instr.operands()),
            KmInstr::MStore(instr) => Box::new(instr.operands()),
        };
        operands
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        let operands: Box<dyn Iterator<Item = &mut Operand> + '_> = match self {
            KmInstr::Invoke(instr) => Box::new(instr.operands_mut()),
            KmInstr::IBinary(instr) => Box::new(instr.operands_mut()),
            KmInstr::MLoad(instr) => Box::new(instr.operands_mut()),
            KmInstr::MStore(instr) => Box::new(instr.operands_mut()),
        };
        operands
    }

    fn destination(&self) -> Option<Name> {
        dispatch!(self, instr => instr.destination())
    }

    fn destination_type(&self) -> Option<Type> {
        dispatch!(self, instr => instr.destination_type())
    }
}
