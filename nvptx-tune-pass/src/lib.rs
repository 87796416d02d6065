//! Pass plugin tuning NVPTX device kernels.
//!
//! Two passes ship with the plugin. `nvptx-tune` appends launch-bound
//! directives (`maxnreg`, `maxntid`, ...) to `nvvm.annotations` for the
//! kernel named by `NVPTX_FUNCTION_NAME` and runs at pipeline start.
//! `global-symbol-rename` makes symbol names valid PTX identifiers; it runs
//! only when named in a pipeline or as its legacy pass.
use kmpass::{
    HOST_VERSION,
    builder::PassBuilder,
    legacy::{PassInfo, PassRegistry},
    plugin::{PLUGIN_API_VERSION, PassPluginLibraryInfo},
    utils::error::{KmError, KmResult},
};
use log::trace;

pub mod options;
pub mod rename;
pub mod tune;

pub use options::{NvptxTuneOptions, TuneDirective};
pub use rename::{GlobalSymbolRenamePass, LegacyGlobalSymbolRenamePass, rename_global_symbols};
pub use tune::{LegacyNvptxTunePass, NvptxTunePass, tune_device_kernels};

pub const PLUGIN_NAME: &str = "NVPTXTunePass";

pub const TUNE_PIPELINE_NAME: &str = "nvptx-tune";
pub const TUNE_LEGACY_PASS_ARG: &str = "legacy-nvptx-tune-pass";
pub const TUNE_LEGACY_PASS_NAME: &str = "NVPTX Tune Pass";

pub const RENAME_PIPELINE_NAME: &str = "global-symbol-rename";
pub const RENAME_LEGACY_PASS_ARG: &str = "global-symbol-rename-pass";
pub const RENAME_LEGACY_PASS_NAME: &str = "Global Symbol Rename Pass";

fn register_pass_builder_callbacks(pb: &mut PassBuilder) {
    // Renaming is opt-in: only `global-symbol-rename` in a pipeline adds it.
    pb.register_pipeline_start_ep_callback(|mpm, _level| {
        mpm.add_pass(NvptxTunePass::new());
    });

    pb.register_pipeline_parsing_callback(|name, params, mpm| match name {
        TUNE_PIPELINE_NAME => {
            let options = NvptxTuneOptions::from_params(params)?;
            trace!("Parsed {} options: {:?}", TUNE_PIPELINE_NAME, options);
            mpm.add_pass(NvptxTunePass::with_options(options));
            Ok(true)
        }
        RENAME_PIPELINE_NAME => {
            if !params.trim().is_empty() {
                return Err(KmError::InvalidPassParameter {
                    pass: RENAME_PIPELINE_NAME.to_string(),
                    param: params.to_string(),
                });
            }
            mpm.add_pass(GlobalSymbolRenamePass);
            Ok(true)
        }
        _ => Ok(false),
    });
}

pub fn nvptx_tune_pass_plugin_info() -> PassPluginLibraryInfo {
    PassPluginLibraryInfo {
        api_version: PLUGIN_API_VERSION,
        plugin_name: PLUGIN_NAME,
        plugin_version: HOST_VERSION,
        register_pass_builder_callbacks,
    }
}

/// Register both legacy passes.
pub fn register_legacy_passes(registry: &mut PassRegistry) -> KmResult<()> {
    registry.register_pass(PassInfo::new::<LegacyNvptxTunePass>(
        TUNE_LEGACY_PASS_ARG,
        TUNE_LEGACY_PASS_NAME,
        false,
        false,
    ))?;
    registry.register_pass(PassInfo::new::<LegacyGlobalSymbolRenamePass>(
        RENAME_LEGACY_PASS_ARG,
        RENAME_LEGACY_PASS_NAME,
        false,
        false,
    ))
}

kmpass::define_pass_plugin!(
    info: nvptx_tune_pass_plugin_info(),
    legacy: register_legacy_passes,
);
