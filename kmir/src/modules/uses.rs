//! Use lists of module-level symbols.
//!
//! The IR does not maintain def-use chains eagerly; use lists are computed on
//! demand by scanning instruction and terminator operands.
use uuid::Uuid;

use crate::modules::{
    Module,
    instructions::{Instruction, KmInstr},
    operand::{Label, Operand},
    symbol::{FunctionPointer, SymbolRef},
};

/// Where inside a basic block a use sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseSite {
    /// Operand of the instruction at the given index.
    Instruction(usize),
    /// Operand of the block terminator.
    Terminator,
}

/// A single use of a symbol by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Use {
    /// Enclosing function of the user.
    pub function: Uuid,
    pub block: Label,
    pub site: UseSite,
    /// `true` when the symbol is the callee of a direct call.
    pub is_callee: bool,
}

fn operand_names(operand: &Operand, symbol: &SymbolRef) -> bool {
    match (operand, symbol) {
        (Operand::Func(ptr), SymbolRef::Function(target)) => ptr == target,
        (Operand::Global(uuid), SymbolRef::Global(target)) => uuid == target,
        _ => false,
    }
}

impl Module {
    /// Every use of `symbol` inside the bodies of defined functions, in module
    /// order.
    pub fn uses_of(&self, symbol: SymbolRef) -> impl Iterator<Item = Use> + '_ {
        self.functions.iter().flat_map(move |func| {
            func.body.values().flat_map(move |bb| {
                let in_instructions = bb.instructions.iter().enumerate().flat_map(move |(index, instr)| {
                    let callee = match instr {
                        KmInstr::Invoke(invoke) => Some(&invoke.function),
                        _ => None,
                    };
                    instr
                        .operands()
                        .filter(move |op| operand_names(op, &symbol))
                        .map(move |op| Use {
                            function: func.uuid,
                            block: bb.label,
                            site: UseSite::Instruction(index),
                            is_callee: callee.is_some_and(|c| std::ptr::eq(c, op)),
                        })
                });

                let in_terminator = bb
                    .terminator
                    .operands()
                    .filter(move |op| operand_names(op, &symbol))
                    .map(move |_| Use {
                        function: func.uuid,
                        block: bb.label,
                        site: UseSite::Terminator,
                        is_callee: false,
                    });

                in_instructions.chain(in_terminator)
            })
        })
    }

    /// Uses of a function symbol.
    pub fn function_uses(&self, ptr: FunctionPointer) -> impl Iterator<Item = Use> + '_ {
        self.uses_of(SymbolRef::Function(ptr))
    }

    /// Returns `true` if `symbol` has no use left in the module.
    pub fn use_empty(&self, symbol: SymbolRef) -> bool {
        self.uses_of(symbol).next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        modules::{
            Function,
            instructions::{Invoke, MStore},
            symbol::ExternalFunction,
            terminator::{Ret, Terminator},
        },
        types::Type,
    };

    #[test]
    fn callee_and_value_uses_are_both_reported() {
        let mut module = Module::new("uses");
        let hook = module.add_external_function(ExternalFunction::new("hook", vec![], None));

        let mut caller = Function::new("caller", vec![(0, Type::Ptr)], None);
        let entry = caller.body.get_mut(&Label::NIL).unwrap();
        entry.instructions.push(KmInstr::Invoke(Invoke {
            function: Operand::Func(hook),
            args: Default::default(),
            dest: None,
            ty: None,
        }));
        entry.instructions.push(KmInstr::MStore(MStore {
            addr: Operand::Reg(0),
            value: Operand::Func(hook),
        }));
        entry.terminator = Terminator::Ret(Ret { value: None });
        let caller_uuid = caller.uuid;
        module.add_function(caller);
        module.add_function(Function::new("other", vec![], None));

        let uses: Vec<_> = module.function_uses(hook).collect();
        assert_eq!(uses.len(), 2);
        assert!(uses.iter().all(|u| u.function == caller_uuid));
        assert!(uses[0].is_callee);
        assert_eq!(uses[1].site, UseSite::Instruction(1));
        assert!(!uses[1].is_callee);
    }

    #[test]
    fn unused_symbol_has_empty_use_list() {
        let mut module = Module::new("unused");
        let hook = module.add_external_function(ExternalFunction::new("hook", vec![], None));
        module.add_function(Function::new("f", vec![], None));
        assert!(module.use_empty(SymbolRef::Function(hook)));
    }
}
