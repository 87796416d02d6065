//! First-class value types.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIs, EnumIter, EnumString, IntoStaticStr};

/// Value type of a register, parameter, global or return value.
///
/// `void` is not a type in this IR; absence of a value is expressed with
/// `Option<Type>` wherever a return type may be missing.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    EnumIter,
    EnumIs,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Type {
    #[strum(serialize = "i1")]
    I1,
    #[strum(serialize = "i8")]
    I8,
    #[strum(serialize = "i16")]
    I16,
    #[strum(serialize = "i32")]
    I32,
    #[strum(serialize = "i64")]
    I64,
    #[strum(serialize = "f32")]
    F32,
    #[strum(serialize = "f64")]
    F64,
    #[strum(serialize = "ptr")]
    Ptr,
}

impl Type {
    /// Size of the type in bytes.
    pub const fn byte_size(&self) -> u32 {
        match self {
            Type::I1 | Type::I8 => 1,
            Type::I16 => 2,
            Type::I32 | Type::F32 => 4,
            Type::I64 | Type::F64 | Type::Ptr => 8,
        }
    }

    /// Returns `true` for the integer types (`i1` to `i64`).
    pub const fn is_integer(&self) -> bool {
        matches!(self, Type::I1 | Type::I8 | Type::I16 | Type::I32 | Type::I64)
    }
}

/// Render an optional return type, `void` when absent.
pub fn fmt_return_type(ty: Option<Type>) -> &'static str {
    match ty {
        Some(ty) => ty.into(),
        None => "void",
    }
}
