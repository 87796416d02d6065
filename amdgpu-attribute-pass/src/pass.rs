use std::io::Write;

use kmir::modules::Module;
use kmpass::{
    ModuleAnalysisManager, PreservedAnalyses, legacy, pass::ModulePass, utils::error::KmResult,
};

use crate::{
    LEGACY_PASS_ARG, PIPELINE_NAME, options::AmdgpuAttributeOptions,
    visitor::annotate_kernel_entries,
};

/// New pass manager adapter.
pub struct AmdgpuAttributePass {
    options: AmdgpuAttributeOptions,
    out: Box<dyn Write>,
}

impl Default for AmdgpuAttributePass {
    fn default() -> Self {
        Self::new()
    }
}

impl AmdgpuAttributePass {
    /// Pass with every option unset, reporting on stdout.
    pub fn new() -> Self {
        Self::with_options(AmdgpuAttributeOptions::new())
    }

    pub fn with_options(options: AmdgpuAttributeOptions) -> Self {
        Self {
            options,
            out: Box::new(std::io::stdout()),
        }
    }

    /// Send the report lines to `out` instead of stdout.
    pub fn with_writer(mut self, out: Box<dyn Write>) -> Self {
        self.out = out;
        self
    }

    pub fn options(&self) -> &AmdgpuAttributeOptions {
        &self.options
    }
}

impl ModulePass for AmdgpuAttributePass {
    fn name(&self) -> &str {
        PIPELINE_NAME
    }

    fn run(
        &mut self,
        module: &mut Module,
        _mam: &mut ModuleAnalysisManager,
    ) -> KmResult<PreservedAnalyses> {
        annotate_kernel_entries(module, &self.options, &mut *self.out)?;
        Ok(PreservedAnalyses::none())
    }

    fn is_required(&self) -> bool {
        true
    }
}

/// Legacy pass manager adapter.
#[derive(Default)]
pub struct LegacyAmdgpuAttributePass {
    inner: AmdgpuAttributePass,
}

impl LegacyAmdgpuAttributePass {
    pub fn new(inner: AmdgpuAttributePass) -> Self {
        Self { inner }
    }
}

impl legacy::ModulePass for LegacyAmdgpuAttributePass {
    fn name(&self) -> &str {
        LEGACY_PASS_ARG
    }

    fn run_on_module(&mut self, module: &mut Module) -> KmResult<bool> {
        annotate_kernel_entries(module, &self.inner.options, &mut *self.inner.out)?;
        Ok(true)
    }
}
