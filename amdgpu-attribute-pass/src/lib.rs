//! Pass plugin marking AMDGPU kernel entry functions.
//!
//! A function is a kernel entry when its body uses both OpenMP device runtime
//! hooks `__kmpc_target_init` and `__kmpc_target_deinit`. Each one receives
//! the `amdgpu-kernel-entry` attribute, optional tuning attributes, and a
//! `Kernel entry function <name>` line on stdout.
//!
//! The plugin is available:
//! - at the pipeline-start extension point of the default pipeline,
//! - under the pipeline name `amdgpu-attribute` (with optional
//!   `<kernel=..;num-sgpr=..;from-env>` parameters),
//! - as the legacy pass `legacy-amdgpuattribute-pass`.
use kmpass::{
    HOST_VERSION,
    builder::PassBuilder,
    legacy::{PassInfo, PassRegistry},
    plugin::{PLUGIN_API_VERSION, PassPluginLibraryInfo},
    utils::error::KmResult,
};
use log::trace;

pub mod options;
pub mod pass;
pub mod visitor;

pub use options::{AmdgpuAttributeOptions, TuningAttribute};
pub use pass::{AmdgpuAttributePass, LegacyAmdgpuAttributePass};
pub use visitor::{KERNEL_ENTRY_ATTRIBUTE, KernelEntrySet, annotate_kernel_entries};

pub const PLUGIN_NAME: &str = "AMDGPUAttributePass";
pub const PIPELINE_NAME: &str = "amdgpu-attribute";
pub const LEGACY_PASS_ARG: &str = "legacy-amdgpuattribute-pass";
pub const LEGACY_PASS_NAME: &str = "AMDGPU Attribute Pass";

fn register_pass_builder_callbacks(pb: &mut PassBuilder) {
    pb.register_pipeline_start_ep_callback(|mpm, _level| {
        mpm.add_pass(AmdgpuAttributePass::new());
    });

    pb.register_pipeline_parsing_callback(|name, params, mpm| {
        if name != PIPELINE_NAME {
            return Ok(false);
        }
        let options = AmdgpuAttributeOptions::from_params(params)?;
        trace!("Parsed {} options: {:?}", PIPELINE_NAME, options);
        mpm.add_pass(AmdgpuAttributePass::with_options(options));
        Ok(true)
    });
}

/// Plugin record for the new pass manager.
pub fn amdgpu_attribute_pass_plugin_info() -> PassPluginLibraryInfo {
    PassPluginLibraryInfo {
        api_version: PLUGIN_API_VERSION,
        plugin_name: PLUGIN_NAME,
        plugin_version: HOST_VERSION,
        register_pass_builder_callbacks,
    }
}

/// Register the legacy pass.
pub fn register_legacy_passes(registry: &mut PassRegistry) -> KmResult<()> {
    registry.register_pass(PassInfo::new::<LegacyAmdgpuAttributePass>(
        LEGACY_PASS_ARG,
        LEGACY_PASS_NAME,
        false,
        false,
    ))
}

kmpass::define_pass_plugin!(
    info: amdgpu_attribute_pass_plugin_info(),
    legacy: register_legacy_passes,
);
