//! Builtin passes available in every textual pipeline.
mod print;
mod verifier;

pub use print::PrintModulePass;
pub use verifier::VerifierPass;
