//! Define external symbols and linkage information for modules.
//!
//! This module provides structures to represent external function
//! declarations, global variables and their linkage within a module.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::{Display, EnumDiscriminants, EnumIs, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::types::Type;

/// Linkage of a defined function or a global variable.
#[derive(
    Debug, Default, Clone, Copy, Hash, PartialEq, Eq, Display, EnumString, IntoStaticStr,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Linkage {
    /// Only directly accessible by objects in the current module. May be
    /// renamed freely to avoid collisions.
    #[strum(serialize = "private")]
    Private,

    /// Similar to `Private`, but the value shows as a local symbol in the
    /// object file.
    #[strum(serialize = "internal")]
    Internal,

    /// May be referenced by other modules, and may also be defined in other
    /// modules.
    #[default]
    #[strum(serialize = "external")]
    External,
}

/// Prefix reserved for intrinsic declarations.
pub const INTRINSIC_PREFIX: &str = "kmir.";

/// Defines an externally linked function
///
/// This struct represents a function that is declared in the current module
/// but defined elsewhere (a runtime library, another translation unit, ...).
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExternalFunction {
    /// Unique identifier for the external function. This is used internally to
    /// reference the function within the module.
    pub uuid: Uuid,

    /// The name of the external function as it appears in the linking context.
    pub name: String,

    /// The parameter types of the external function.
    pub param_types: Vec<Type>,

    /// The return type of the external function. `None` indicates a `void` return type.
    pub return_type: Option<Type>,
}

impl ExternalFunction {
    pub fn new(name: impl Into<String>, param_types: Vec<Type>, return_type: Option<Type>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            param_types,
            return_type,
        }
    }

    /// Intrinsics are declarations provided by the compiler itself.
    pub fn is_intrinsic(&self) -> bool {
        self.name.starts_with(INTRINSIC_PREFIX)
    }
}

/// A module-level variable.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GlobalVariable {
    pub uuid: Uuid,
    pub name: String,
    pub ty: Type,
    pub linkage: Linkage,
    /// Integer initializer, `None` for zero-initialized storage.
    pub initializer: Option<i64>,
}

impl GlobalVariable {
    pub fn new(name: impl Into<String>, ty: Type, initializer: Option<i64>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            ty,
            linkage: Linkage::default(),
            initializer,
        }
    }
}

/// A reference to a function symbol, internal or external.
///
/// Internal functions are defined within the current module, while external
/// functions are declared but defined outside the module.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, EnumDiscriminants, EnumIs)]
#[strum_discriminants(name(FunctionPointerType))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FunctionPointer {
    /// Reference to a function defined within the current module
    Internal(Uuid),

    /// Reference to an external function (ie., defined in `ExternalFunction`)
    External(Uuid),
}

impl FunctionPointer {
    /// Get the UUID of the function pointer, regardless of its type.
    pub fn uuid(&self) -> Uuid {
        match self {
            FunctionPointer::Internal(uuid) => *uuid,
            FunctionPointer::External(uuid) => *uuid,
        }
    }
}

impl std::fmt::Display for FunctionPointerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionPointerType::Internal => write!(f, "internal"),
            FunctionPointerType::External => write!(f, "external"),
        }
    }
}

/// Any named module-level symbol.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SymbolRef {
    Function(FunctionPointer),
    Global(Uuid),
}
