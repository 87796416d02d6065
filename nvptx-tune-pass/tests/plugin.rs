use std::{io::Write, sync::Arc};

use kmir::modules::parser::parse_module;
use kmpass::{
    HOST_VERSION, ModuleAnalysisManager, ModulePassManager,
    builder::{OptimizationLevel, PassBuilder},
    legacy::{PassManager, PassRegistry},
    magic::NVVM_ANNOTATIONS,
    plugin::{PLUGIN_API_VERSION, PassPlugin, RegisterLegacyPassesFn},
    utils::error::KmError,
};
use nvptx_tune_pass::{
    GlobalSymbolRenamePass, NvptxTuneOptions, NvptxTunePass, PLUGIN_NAME, RENAME_LEGACY_PASS_ARG,
    RENAME_PIPELINE_NAME, TUNE_LEGACY_PASS_ARG, TUNE_PIPELINE_NAME, TuneDirective,
    nvptx_tune_pass_plugin_info, register_legacy_passes,
};
use parking_lot::Mutex;

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

const KERNEL: &str = r#"
global internal i32 @team.state = 0

define void @omp.kernel(%env: ptr) {
entry:
    store 1, @team.state
    ret void
}

!nvvm.annotations = !{@omp.kernel, "kernel", 1}
"#;

fn plugin() -> PassPlugin {
    PassPlugin::from_info(
        nvptx_tune_pass_plugin_info(),
        Some(register_legacy_passes as RegisterLegacyPassesFn),
    )
    .unwrap()
}

#[test]
fn plugin_record_describes_the_plugin() {
    let info = nvptx_tune_pass_plugin_info();
    assert_eq!(info.api_version, PLUGIN_API_VERSION);
    assert_eq!(info.plugin_name, PLUGIN_NAME);
    assert_eq!(info.plugin_version, HOST_VERSION);
    assert_eq!(
        nvptx_tune_pass::__kmpass_get_plugin_info().plugin_name,
        "NVPTXTunePass"
    );
}

#[test]
fn default_pipeline_tunes_without_renaming() {
    let mut pb = PassBuilder::new();
    plugin().register_pass_builder_callbacks(&mut pb);

    let mpm = pb.build_per_module_default_pipeline(OptimizationLevel::O2);
    assert_eq!(mpm.pass_names().collect::<Vec<_>>(), vec![TUNE_PIPELINE_NAME]);

    let mut module = parse_module(KERNEL).unwrap();
    let mut mpm = mpm;
    mpm.run(&mut module, &mut ModuleAnalysisManager::new()).unwrap();
    assert!(module.function_by_name("omp.kernel").is_some());
    assert!(module.function_by_name("omp_kernel").is_none());
}

#[test]
fn tuning_runs_before_renaming() {
    let mut module = parse_module(KERNEL).unwrap();

    let mut options = NvptxTuneOptions::new();
    options.function_name = "omp.kernel".to_string();
    options.set(TuneDirective::MaxRegisters, 64);

    let capture = Capture::default();
    let mut mpm = ModulePassManager::new();
    mpm.add_pass(NvptxTunePass::with_options(options).with_writer(Box::new(capture.clone())));
    mpm.add_pass(GlobalSymbolRenamePass);
    mpm.run(&mut module, &mut ModuleAnalysisManager::new()).unwrap();

    let out = String::from_utf8(capture.0.lock().clone()).unwrap();
    assert_eq!(
        out,
        "Found Function omp.kernel\n\
         Kernel entry function omp.kernel\n\
         Set Metadata maxnreg => 64\n"
    );

    let printed = module.to_string();
    assert!(printed.contains("store 1, @team_state"));
    assert!(printed.contains("!nvvm.annotations = !{@omp_kernel, \"kernel\", 1}"));
    assert!(printed.contains("!nvvm.annotations = !{@omp_kernel, \"maxnreg\", 64}"));
    assert_eq!(
        module.get_named_metadata(NVVM_ANNOTATIONS).unwrap().operands.len(),
        2
    );
}

#[test]
fn passes_are_available_by_pipeline_name() {
    let mut pb = PassBuilder::new();
    plugin().register_pass_builder_callbacks(&mut pb);

    let mpm = pb
        .parse_pass_pipeline("nvptx-tune<function=k;max-threads=128>,global-symbol-rename")
        .unwrap();
    assert_eq!(
        mpm.pass_names().collect::<Vec<_>>(),
        vec![TUNE_PIPELINE_NAME, RENAME_PIPELINE_NAME]
    );

    assert!(matches!(
        pb.parse_pass_pipeline("global-symbol-rename<all>"),
        Err(KmError::InvalidPassParameter { .. })
    ));
    assert!(matches!(
        pb.parse_pass_pipeline("nvptx-tune<max-threads=lots>"),
        Err(KmError::InvalidPassParameter { .. })
    ));
}

#[test]
fn legacy_passes_are_registered() {
    let mut registry = PassRegistry::new();
    plugin().register_legacy_passes(&mut registry).unwrap();

    let tune = registry.get_pass_info(TUNE_LEGACY_PASS_ARG).unwrap();
    assert_eq!(tune.name, "NVPTX Tune Pass");
    let rename = registry.get_pass_info(RENAME_LEGACY_PASS_ARG).unwrap();
    assert_eq!(rename.name, "Global Symbol Rename Pass");
    assert!(!rename.cfg_only && !rename.is_analysis);

    let mut module = parse_module(KERNEL).unwrap();
    let mut pm = PassManager::new();
    pm.add_by_arg(&registry, RENAME_LEGACY_PASS_ARG).unwrap();
    assert!(pm.run(&mut module).unwrap());
    assert!(module.function_by_name("omp_kernel").is_some());
}
