use std::{io::Write, sync::Arc};

use amdgpu_attribute_pass::{
    AmdgpuAttributeOptions, AmdgpuAttributePass, KERNEL_ENTRY_ATTRIBUTE, LegacyAmdgpuAttributePass,
    TuningAttribute,
};
use kmir::modules::{Module, parser::parse_module};
use kmpass::{
    ModuleAnalysisManager, ModulePassManager, analysis::CallGraphAnalysis, legacy,
};
use parking_lot::Mutex;

/// Write sink whose content stays readable after the pass took ownership.
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

impl Capture {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().clone()).unwrap()
    }
}

fn run_pass(module: &mut Module, options: AmdgpuAttributeOptions) -> String {
    let capture = Capture::default();
    let mut mpm = ModulePassManager::new();
    mpm.add_pass(AmdgpuAttributePass::with_options(options).with_writer(Box::new(capture.clone())));
    mpm.run(module, &mut ModuleAnalysisManager::new()).unwrap();
    capture.text()
}

fn annotated(module: &Module) -> Vec<&str> {
    module
        .functions
        .iter()
        .filter(|f| f.has_fn_attr(KERNEL_ENTRY_ATTRIBUTE))
        .map(|f| f.name.as_str())
        .collect()
}

const FOO_BAR_BAZ: &str = r#"
declare i32 @__kmpc_target_init(ptr, ptr)
declare void @__kmpc_target_deinit()

define void @foo(%env: ptr) {
entry:
    %r: i32 = call @__kmpc_target_init(%env, null)
    call @__kmpc_target_deinit()
    ret void
}

define void @bar(%env: ptr) {
entry:
    %r: i32 = call @__kmpc_target_init(%env, null)
    ret void
}

define void @baz() {
entry:
    ret void
}
"#;

#[test]
fn only_the_function_using_both_hooks_is_annotated() {
    let mut module = parse_module(FOO_BAR_BAZ).unwrap();
    let out = run_pass(&mut module, AmdgpuAttributeOptions::new());

    assert_eq!(out, "Kernel entry function foo\n");
    assert_eq!(annotated(&module), vec!["foo"]);
}

#[test]
fn deinit_only_function_is_not_annotated() {
    let mut module = parse_module(
        r#"
declare void @__kmpc_target_deinit()

define void @tail() {
entry:
    call @__kmpc_target_deinit()
    ret void
}
"#,
    )
    .unwrap();

    assert_eq!(run_pass(&mut module, AmdgpuAttributeOptions::new()), "");
    assert!(annotated(&module).is_empty());
}

#[test]
fn empty_module_is_left_without_attributes() {
    let mut module = Module::new("empty");
    let out = run_pass(&mut module, AmdgpuAttributeOptions::new());

    assert!(out.is_empty());
    assert!(module.functions.is_empty());
    assert!(module.globals.is_empty());
    assert!(module.named_metadata.is_empty());

    let declared: Vec<_> = module
        .external_functions
        .iter()
        .map(|ext| ext.name.as_str())
        .collect();
    assert_eq!(declared, vec!["__kmpc_target_init", "__kmpc_target_deinit"]);
    assert_eq!(
        module.to_string(),
        "module \"empty\"\n\n\
         declare i32 @__kmpc_target_init(ptr, ptr)\n\
         declare void @__kmpc_target_deinit()\n"
    );
}

#[test]
fn hooks_reached_through_helpers_do_not_count() {
    let mut module = parse_module(
        r#"
declare i32 @__kmpc_target_init(ptr, ptr)
declare void @__kmpc_target_deinit()

define void @start(%env: ptr) {
entry:
    %r: i32 = call @__kmpc_target_init(%env, null)
    ret void
}

define void @stop() {
entry:
    call @__kmpc_target_deinit()
    ret void
}

define void @kernel(%env: ptr) {
entry:
    call @start(%env)
    call @stop()
    ret void
}
"#,
    )
    .unwrap();

    assert_eq!(run_pass(&mut module, AmdgpuAttributeOptions::new()), "");
    assert!(annotated(&module).is_empty());
}

#[test]
fn hook_passed_as_a_value_is_a_use() {
    let mut module = parse_module(
        r#"
declare i32 @__kmpc_target_init(ptr, ptr)
declare void @__kmpc_target_deinit()
declare void @atexit(ptr)

define void @kernel(%env: ptr) {
entry:
    %r: i32 = call @__kmpc_target_init(%env, null)
    call @atexit(@__kmpc_target_deinit)
    ret void
}
"#,
    )
    .unwrap();

    assert_eq!(
        run_pass(&mut module, AmdgpuAttributeOptions::new()),
        "Kernel entry function kernel\n"
    );
}

#[test]
fn hooks_spread_over_blocks_count() {
    let mut module = parse_module(
        r#"
declare i32 @__kmpc_target_init(ptr, ptr)
declare void @__kmpc_target_deinit()

define void @kernel(%env: ptr) {
entry:
    %r: i32 = call @__kmpc_target_init(%env, null)
    %c: i1 = and %r, 1
    branch %c, work, done
work:
    jump done
done:
    call @__kmpc_target_deinit()
    ret void
}
"#,
    )
    .unwrap();

    run_pass(&mut module, AmdgpuAttributeOptions::new());
    assert_eq!(annotated(&module), vec!["kernel"]);
}

#[test]
fn second_run_is_idempotent() {
    let mut module = parse_module(FOO_BAR_BAZ).unwrap();
    let first = run_pass(&mut module, AmdgpuAttributeOptions::new());
    let after_first = module.to_string();

    let second = run_pass(&mut module, AmdgpuAttributeOptions::new());
    assert_eq!(first, second);
    assert_eq!(module.to_string(), after_first);
    assert_eq!(module.external_functions.len(), 2);
    assert_eq!(module.function_by_name("foo").unwrap().attributes.len(), 1);
}

#[test]
fn report_has_one_line_per_annotated_function() {
    let mut module = parse_module(
        r#"
declare i32 @__kmpc_target_init(ptr, ptr)
declare void @__kmpc_target_deinit()

define void @a(%env: ptr) {
entry:
    %r: i32 = call @__kmpc_target_init(%env, null)
    call @__kmpc_target_deinit()
    ret void
}

define void @b(%env: ptr) {
entry:
    %r: i32 = call @__kmpc_target_init(%env, null)
    %s: i32 = call @__kmpc_target_init(%env, null)
    call @__kmpc_target_deinit()
    call @__kmpc_target_deinit()
    ret void
}

define void @c() {
entry:
    ret void
}
"#,
    )
    .unwrap();

    let out = run_pass(&mut module, AmdgpuAttributeOptions::new());
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(lines, vec!["Kernel entry function a", "Kernel entry function b"]);
    assert_eq!(lines.len(), annotated(&module).len());
}

#[test]
fn tuning_attributes_are_reported_and_set() {
    let mut module = parse_module(FOO_BAR_BAZ).unwrap();
    let mut options = AmdgpuAttributeOptions::new();
    options.set_tuning(TuningAttribute::NumSgpr, "32");

    let out = run_pass(&mut module, options);
    assert_eq!(
        out,
        "Kernel entry function foo\nSet Attribute amdgpu-num-sgpr => 32\n"
    );
    assert_eq!(
        module.function_by_name("foo").unwrap().get_fn_attr("amdgpu-num-sgpr"),
        Some("32")
    );
}

#[test]
fn pass_runs_on_optnone_modules_and_invalidates_analyses() {
    let mut module = parse_module(
        r#"
declare i32 @__kmpc_target_init(ptr, ptr)
declare void @__kmpc_target_deinit()

define void @foo(%env: ptr) optnone {
entry:
    %r: i32 = call @__kmpc_target_init(%env, null)
    call @__kmpc_target_deinit()
    ret void
}
"#,
    )
    .unwrap();
    assert!(module.is_optnone());

    let capture = Capture::default();
    let mut mpm = ModulePassManager::new();
    mpm.add_pass(AmdgpuAttributePass::new().with_writer(Box::new(capture.clone())));

    let mut mam = ModuleAnalysisManager::new();
    mam.get_result::<CallGraphAnalysis>(&module);
    let preserved = mpm.run(&mut module, &mut mam).unwrap();

    assert_eq!(capture.text(), "Kernel entry function foo\n");
    assert!(!preserved.are_all_preserved());
    assert!(!preserved.is_preserved::<CallGraphAnalysis>());
    assert!(mam.get_cached_result::<CallGraphAnalysis>().is_none());
}

#[test]
fn legacy_adapter_reports_modification() {
    let mut module = parse_module(FOO_BAR_BAZ).unwrap();
    let capture = Capture::default();
    let mut pass = LegacyAmdgpuAttributePass::new(
        AmdgpuAttributePass::new().with_writer(Box::new(capture.clone())),
    );

    assert!(legacy::ModulePass::run_on_module(&mut pass, &mut module).unwrap());
    assert_eq!(capture.text(), "Kernel entry function foo\n");

    let mut empty = Module::new("empty");
    assert!(legacy::ModulePass::run_on_module(&mut pass, &mut empty).unwrap());
}
