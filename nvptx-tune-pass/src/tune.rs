//! NVPTX launch-bound tuning of device kernels.
use std::io::Write;

use kmir::modules::{
    Module,
    metadata::{MetadataNode, MetadataValue},
};
use kmpass::{
    ModuleAnalysisManager, PreservedAnalyses, legacy, magic::NVVM_ANNOTATIONS, openmp,
    pass::ModulePass, utils::error::KmResult,
};
use log::debug;
use uuid::Uuid;

use crate::{TUNE_LEGACY_PASS_ARG, TUNE_PIPELINE_NAME, options::NvptxTuneOptions};

/// Append the set directives of `options` to `nvvm.annotations` for the
/// device kernel named by the options. Returns the tuned kernels.
pub fn tune_device_kernels(
    module: &mut Module,
    options: &NvptxTuneOptions,
    out: &mut dyn Write,
) -> KmResult<Vec<Uuid>> {
    let kernels: Vec<_> = openmp::device_kernels(module)
        .into_iter()
        .map(|func| (func.uuid, func.pointer(), func.name.clone()))
        .collect();
    debug!("Found {} device kernel(s) in `{}`", kernels.len(), module.name);

    module.get_or_insert_named_metadata(NVVM_ANNOTATIONS);

    let mut tuned = Vec::new();
    for (uuid, ptr, name) in kernels {
        writeln!(out, "Found Function {}", name)?;
        if name != options.function_name {
            writeln!(out, "Skip {}", name)?;
            continue;
        }

        writeln!(out, "Kernel entry function {}", name)?;
        for (directive, value) in options.directives() {
            writeln!(out, "Set Metadata {} => {}", directive, value)?;
            module
                .get_or_insert_named_metadata(NVVM_ANNOTATIONS)
                .add_operand(MetadataNode(vec![
                    MetadataValue::function(ptr),
                    MetadataValue::Str(directive.to_string()),
                    MetadataValue::Int(value),
                ]));
        }
        tuned.push(uuid);
    }

    out.flush()?;
    Ok(tuned)
}

pub struct NvptxTunePass {
    options: NvptxTuneOptions,
    out: Box<dyn Write>,
}

impl Default for NvptxTunePass {
    fn default() -> Self {
        Self::new()
    }
}

impl NvptxTunePass {
    /// Pass configured from the environment, reporting on stdout.
    pub fn new() -> Self {
        Self::with_options(NvptxTuneOptions::from_env())
    }

    pub fn with_options(options: NvptxTuneOptions) -> Self {
        Self {
            options,
            out: Box::new(std::io::stdout()),
        }
    }

    pub fn with_writer(mut self, out: Box<dyn Write>) -> Self {
        self.out = out;
        self
    }
}

impl ModulePass for NvptxTunePass {
    fn name(&self) -> &str {
        TUNE_PIPELINE_NAME
    }

    fn run(
        &mut self,
        module: &mut Module,
        _mam: &mut ModuleAnalysisManager,
    ) -> KmResult<PreservedAnalyses> {
        tune_device_kernels(module, &self.options, &mut *self.out)?;
        Ok(PreservedAnalyses::none())
    }

    fn is_required(&self) -> bool {
        true
    }
}

#[derive(Default)]
pub struct LegacyNvptxTunePass {
    inner: NvptxTunePass,
}

impl LegacyNvptxTunePass {
    pub fn new(inner: NvptxTunePass) -> Self {
        Self { inner }
    }
}

impl legacy::ModulePass for LegacyNvptxTunePass {
    fn name(&self) -> &str {
        TUNE_LEGACY_PASS_ARG
    }

    fn run_on_module(&mut self, module: &mut Module) -> KmResult<bool> {
        tune_device_kernels(module, &self.inner.options, &mut *self.inner.out)?;
        Ok(true)
    }
}
