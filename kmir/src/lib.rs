//! Intermediate representation consumed by the `kmpass` pipeline.
//!
//! A [`modules::Module`] owns defined functions, external declarations,
//! global variables and named metadata. Passes inspect and mutate it in
//! place; the textual form (see [`modules::parser`] and [`modules::fmt`]) is
//! mostly used to write tests and fixtures.

pub mod modules;
pub mod types;
pub mod utils;
