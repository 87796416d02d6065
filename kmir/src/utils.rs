use strum::EnumIs;
use thiserror::Error;
use uuid::Uuid;

use crate::modules::operand::{Label, Name};

#[derive(Debug, PartialEq, Eq, Hash, EnumIs, Error)]
pub enum Error {
    /// An operand refers to a name that has not been defined.
    #[error(
        "Multiple operations with shared destination target violate SSA requirements. The name `%{duplicate}` is defined more than once in function `{function}`."
    )]
    DuplicateSSAName { function: String, duplicate: Name },

    /// No basic block with the entrypoint label was found.
    #[error(
        "By convention, the entrypoint basic block of a function must have label `block_0`. Function `{function}` has no such basic block."
    )]
    MissingEntryBlock { function: String },

    /// An operand refers to an unresolved name.
    #[error("An operand of function `{function}` refers to an undefined name: `%{undefined}`.")]
    UndefinedSSAName { function: String, undefined: Name },

    /// Provided internal function is not defined within the module.
    #[error(
        "An instruction of function `{function}` refers to an internal function referenced by `{undefined}` that is not defined within the module."
    )]
    UndefinedInternalFunction { function: String, undefined: Uuid },

    /// Provided external function is not declared within the module.
    #[error(
        "An instruction of function `{function}` refers to an external function referenced by `{undefined}` that is not declared within the module."
    )]
    UndefinedExternalFunction { function: String, undefined: Uuid },

    /// Provided global variable is not defined within the module.
    #[error(
        "An instruction of function `{function}` refers to a global variable referenced by `{undefined}` that is not defined within the module."
    )]
    UndefinedGlobal { function: String, undefined: Uuid },

    /// The basic block referenced cannot be found within the function.
    #[error(
        "The basic block `{label}` referenced in function `{function}` is not defined within the function."
    )]
    UndefinedBasicBlock { function: String, label: Label },

    /// Two symbols of the module share the same name.
    #[error("The symbol name `@{name}` is used by more than one function, declaration or global.")]
    DuplicateSymbol { name: String },

    /// A symbol name used in the textual form could not be resolved.
    #[error("Reference to undefined symbol `@{name}`.")]
    UnresolvedSymbol { name: String },

    /// The textual form could not be parsed.
    #[error("Failed to parse module: {message}")]
    ParseError { message: String },
}
