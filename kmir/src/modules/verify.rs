//! Structural well-formedness checks.
use std::collections::BTreeSet;

use log::trace;

use crate::{
    modules::{
        Function, Module,
        instructions::Instruction,
        operand::{Label, Operand},
        symbol::FunctionPointer,
    },
    utils::Error,
};

impl Function {
    /// Verify SSA form:
    /// 1) The entry block exists.
    /// 2) Each name is defined exactly once.
    /// 3) Each operand refers to a defined name.
    /// 4) Each branch target exists.
    pub fn check_ssa(&self) -> Result<(), Error> {
        if !self.body.contains_key(&Label::NIL) {
            return Err(Error::MissingEntryBlock {
                function: self.name.clone(),
            });
        }

        let mut defined_names = BTreeSet::new();
        let params = self.params.iter().map(|(name, _)| *name);
        let dests = self.instructions().filter_map(|(_, instr)| instr.destination());
        for name in params.chain(dests) {
            if !defined_names.insert(name) {
                return Err(Error::DuplicateSSAName {
                    function: self.name.clone(),
                    duplicate: name,
                });
            }
        }

        for bb in self.body.values() {
            let operands = bb
                .instructions
                .iter()
                .flat_map(|instr| instr.operands())
                .chain(bb.terminator.operands());

            for operand in operands {
                if let Operand::Reg(name) = operand {
                    if !defined_names.contains(name) {
                        return Err(Error::UndefinedSSAName {
                            function: self.name.clone(),
                            undefined: *name,
                        });
                    }
                }
            }

            for target in bb.terminator.successors() {
                if !self.body.contains_key(&target) {
                    return Err(Error::UndefinedBasicBlock {
                        function: self.name.clone(),
                        label: target,
                    });
                }
            }
        }

        Ok(())
    }
}

impl Module {
    /// Verify the module: unique symbol names, resolvable symbol references
    /// and SSA form of every function.
    pub fn verify(&self) -> Result<(), Error> {
        let mut names = BTreeSet::new();
        let all_names = self
            .functions
            .iter()
            .map(|f| f.name.as_str())
            .chain(self.external_functions.iter().map(|f| f.name.as_str()))
            .chain(self.globals.iter().map(|g| g.name.as_str()));
        for name in all_names {
            if !names.insert(name) {
                return Err(Error::DuplicateSymbol {
                    name: name.to_string(),
                });
            }
        }

        for func in &self.functions {
            trace!("Verifying function `{}`", func.name);
            func.check_ssa()?;

            let operands = func.body.values().flat_map(|bb| {
                bb.instructions
                    .iter()
                    .flat_map(|instr| instr.operands())
                    .chain(bb.terminator.operands())
            });

            for operand in operands {
                match operand {
                    Operand::Func(FunctionPointer::Internal(uuid))
                        if self.get_function(*uuid).is_none() =>
                    {
                        return Err(Error::UndefinedInternalFunction {
                            function: func.name.clone(),
                            undefined: *uuid,
                        });
                    }
                    Operand::Func(FunctionPointer::External(uuid))
                        if self.get_external_function(*uuid).is_none() =>
                    {
                        return Err(Error::UndefinedExternalFunction {
                            function: func.name.clone(),
                            undefined: *uuid,
                        });
                    }
                    Operand::Global(uuid) if self.get_global(*uuid).is_none() => {
                        return Err(Error::UndefinedGlobal {
                            function: func.name.clone(),
                            undefined: *uuid,
                        });
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }
}
