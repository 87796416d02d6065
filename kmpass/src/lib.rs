//! Host-side pass framework for `kmir` modules.
//!
//! The crate provides what a pass plugin needs to hook into a pipeline:
//! the new pass manager ([`pass::ModulePassManager`]) with analysis
//! invalidation, the legacy pass manager ([`legacy::PassManager`]), a
//! [`builder::PassBuilder`] exposing extension points and textual pipelines,
//! and the plugin loader ([`plugin::PassPlugin`]). Most plugins only touch
//! [`pass::ModulePass`], [`analysis::PreservedAnalyses`] and the
//! [`define_pass_plugin!`] macro.

pub mod analysis;
pub mod builder;
pub mod legacy;
pub mod magic;
pub mod meta;
pub mod openmp;
pub mod pass;
pub mod passes;
pub mod plugin;
pub mod utils;

pub use analysis::{ModuleAnalysisManager, PreservedAnalyses};
pub use pass::{ModulePass, ModulePassManager};

/// Version of the host, checked against the version a plugin was built with.
pub const HOST_VERSION: &str = env!("CARGO_PKG_VERSION");
