//! Module, function and basic-block containers.
//!
//! Submodules contain the pieces a module is made of:
//!
//! - `instructions`: the instruction kinds and the [`instructions::Instruction`] trait
//! - `operand`: SSA names, labels and operands
//! - `symbol`: declarations, globals and function pointers
//! - `attributes`: function attributes
//! - `metadata`: named module metadata
//! - `uses`: use lists of module-level symbols
//! - `verify`: structural well-formedness checks
//! - `fmt` / `parser`: textual form
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    modules::{
        attributes::{AttrKind, AttributeSet},
        instructions::KmInstr,
        metadata::NamedMetadata,
        operand::{Label, Name},
        symbol::{ExternalFunction, FunctionPointer, GlobalVariable, Linkage, SymbolRef},
        terminator::Terminator,
    },
    types::Type,
};

pub mod attributes;
pub mod fmt;
pub mod instructions;
pub mod metadata;
pub mod operand;
#[cfg(feature = "chumsky")]
pub mod parser;
pub mod symbol;
pub mod terminator;
pub mod uses;
pub mod verify;

/// A basic block within a function, containing a sequence of instructions
/// and ending with a control flow terminator.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BasicBlock {
    pub label: Label,
    pub instructions: Vec<KmInstr>,
    pub terminator: Terminator,
}

/// A function made of basic blocks and parameter metadata.
///
/// By convention the entrypoint is the basic block with the [`Label::NIL`] label.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Function {
    pub uuid: Uuid,
    pub name: String,
    pub params: Vec<(Name, Type)>,
    pub return_type: Option<Type>,
    pub body: BTreeMap<Label, BasicBlock>,
    pub linkage: Linkage,
    pub attributes: AttributeSet,
}

impl Function {
    /// Create a function with an empty entry block returning `void`.
    pub fn new(name: impl Into<String>, params: Vec<(Name, Type)>, return_type: Option<Type>) -> Self {
        let entry = BasicBlock {
            label: Label::NIL,
            instructions: Vec::new(),
            terminator: Terminator::Unreachable,
        };

        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            params,
            return_type,
            body: BTreeMap::from([(Label::NIL, entry)]),
            linkage: Linkage::default(),
            attributes: AttributeSet::default(),
        }
    }

    /// Pointer used by instructions to reference this function.
    pub fn pointer(&self) -> FunctionPointer {
        FunctionPointer::Internal(self.uuid)
    }

    /// Add (or replace) a string attribute.
    pub fn add_fn_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.add_string(key, value);
    }

    pub fn has_fn_attr(&self, key: &str) -> bool {
        self.attributes.has_string(key)
    }

    pub fn get_fn_attr(&self, key: &str) -> Option<&str> {
        self.attributes.get_string(key)
    }

    /// Functions flagged `optnone` are skipped by optional passes.
    pub fn is_optnone(&self) -> bool {
        self.attributes.has_kind(AttrKind::OptNone)
    }

    pub fn entry(&self) -> Option<&BasicBlock> {
        self.body.get(&Label::NIL)
    }

    /// Iterate over every instruction together with its block label.
    pub fn instructions(&self) -> impl Iterator<Item = (Label, &KmInstr)> {
        self.body
            .values()
            .flat_map(|bb| bb.instructions.iter().map(move |instr| (bb.label, instr)))
    }

    /// Callees of the direct calls in this function, in program order.
    pub fn direct_callees(&self) -> impl Iterator<Item = FunctionPointer> + '_ {
        self.instructions()
            .filter_map(|(_, instr)| instr.as_invoke().and_then(|invoke| invoke.callee()))
    }

    /// Find next available [`Name`] for a new SSA value.
    pub fn next_available_name(&self) -> Name {
        use crate::modules::instructions::Instruction;

        let params = self.params.iter().map(|(name, _)| *name);
        let dests = self.instructions().filter_map(|(_, instr)| instr.destination());
        params.chain(dests).max().map_or(0, |max| max + 1)
    }
}

/// A module containing defined functions and references to external ones.
///
/// `Module` acts as the compilation unit boundary for symbol visibility.
/// Functions are kept in insertion order; that order is the module's native
/// iteration order.
#[derive(Debug, Default, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
    pub external_functions: Vec<ExternalFunction>,
    pub globals: Vec<GlobalVariable>,
    pub named_metadata: Vec<NamedMetadata>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_function(&mut self, function: Function) -> FunctionPointer {
        let ptr = function.pointer();
        self.functions.push(function);
        ptr
    }

    pub fn add_external_function(&mut self, function: ExternalFunction) -> FunctionPointer {
        let ptr = FunctionPointer::External(function.uuid);
        self.external_functions.push(function);
        ptr
    }

    pub fn add_global(&mut self, global: GlobalVariable) -> Uuid {
        let uuid = global.uuid;
        self.globals.push(global);
        uuid
    }

    pub fn get_function(&self, uuid: Uuid) -> Option<&Function> {
        self.functions.iter().find(|func| func.uuid == uuid)
    }

    pub fn get_function_mut(&mut self, uuid: Uuid) -> Option<&mut Function> {
        self.functions.iter_mut().find(|func| func.uuid == uuid)
    }

    pub fn get_external_function(&self, uuid: Uuid) -> Option<&ExternalFunction> {
        self.external_functions.iter().find(|func| func.uuid == uuid)
    }

    pub fn get_global(&self, uuid: Uuid) -> Option<&GlobalVariable> {
        self.globals.iter().find(|global| global.uuid == uuid)
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|func| func.name == name)
    }

    pub fn function_by_name_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|func| func.name == name)
    }

    pub fn external_function_by_name(&self, name: &str) -> Option<&ExternalFunction> {
        self.external_functions.iter().find(|func| func.name == name)
    }

    /// Resolve a symbol name to whatever module-level entity carries it.
    pub fn find_symbol(&self, name: &str) -> Option<SymbolRef> {
        if let Some(func) = self.function_by_name(name) {
            return Some(SymbolRef::Function(func.pointer()));
        }
        if let Some(ext) = self.external_function_by_name(name) {
            return Some(SymbolRef::Function(FunctionPointer::External(ext.uuid)));
        }
        self.globals
            .iter()
            .find(|global| global.name == name)
            .map(|global| SymbolRef::Global(global.uuid))
    }

    /// Name of the function (defined or declared) behind `ptr`.
    pub fn function_name(&self, ptr: &FunctionPointer) -> Option<&str> {
        match ptr {
            FunctionPointer::Internal(uuid) => self.get_function(*uuid).map(|f| f.name.as_str()),
            FunctionPointer::External(uuid) => {
                self.get_external_function(*uuid).map(|f| f.name.as_str())
            }
        }
    }

    /// Name of any symbol.
    pub fn symbol_name(&self, symbol: &SymbolRef) -> Option<&str> {
        match symbol {
            SymbolRef::Function(ptr) => self.function_name(ptr),
            SymbolRef::Global(uuid) => self.get_global(*uuid).map(|g| g.name.as_str()),
        }
    }

    /// Returns `true` when no symbol is named `name`.
    pub fn is_symbol_name_free(&self, name: &str) -> bool {
        self.find_symbol(name).is_none()
    }

    pub fn get_named_metadata(&self, name: &str) -> Option<&NamedMetadata> {
        self.named_metadata.iter().find(|md| md.name == name)
    }

    pub fn get_or_insert_named_metadata(&mut self, name: &str) -> &mut NamedMetadata {
        let index = match self.named_metadata.iter().position(|md| md.name == name) {
            Some(index) => index,
            None => {
                self.named_metadata.push(NamedMetadata::new(name));
                self.named_metadata.len() - 1
            }
        };
        &mut self.named_metadata[index]
    }

    /// A module is optnone when it defines at least one function and every
    /// defined function is flagged `optnone` (the usual shape at `-O0`).
    pub fn is_optnone(&self) -> bool {
        !self.functions.is_empty() && self.functions.iter().all(Function::is_optnone)
    }
}
