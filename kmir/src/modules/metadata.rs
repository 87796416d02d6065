//! Named module metadata.
//!
//! A named metadata entry (e.g. `!nvvm.annotations`) is an ordered list of
//! tuples; each tuple holds symbol references, strings and integers.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::EnumIs;
use uuid::Uuid;

use crate::modules::symbol::{FunctionPointer, SymbolRef};

/// One element of a metadata tuple.
#[derive(Debug, Clone, Hash, PartialEq, Eq, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MetadataValue {
    Symbol(SymbolRef),
    Str(String),
    Int(i64),
}

impl MetadataValue {
    pub fn function(ptr: FunctionPointer) -> Self {
        MetadataValue::Symbol(SymbolRef::Function(ptr))
    }

    pub fn global(uuid: Uuid) -> Self {
        MetadataValue::Symbol(SymbolRef::Global(uuid))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<FunctionPointer> {
        match self {
            MetadataValue::Symbol(SymbolRef::Function(ptr)) => Some(*ptr),
            _ => None,
        }
    }
}

/// A metadata tuple `!{ ... }`.
#[derive(Debug, Default, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetadataNode(pub Vec<MetadataValue>);

/// A named list of metadata tuples.
#[derive(Debug, Default, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NamedMetadata {
    pub name: String,
    pub operands: Vec<MetadataNode>,
}

impl NamedMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operands: Vec::new(),
        }
    }

    pub fn add_operand(&mut self, node: MetadataNode) {
        self.operands.push(node);
    }
}
