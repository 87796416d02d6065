use kmir::modules::{
    Module,
    parser::{extend_module_from_string, parse_module},
    symbol::SymbolRef,
    uses::UseSite,
};

const KERNELS: &str = r#"
module "kernels"

declare i32 @__kmpc_target_init(ptr, ptr)
declare void @__kmpc_target_deinit()

define void @helper(%p: ptr) {
entry:
    %r: i32 = call @__kmpc_target_init(%p, null)
    ret void
}

define void @kernel(%env: ptr) {
entry:
    %r: i32 = call @__kmpc_target_init(%env, null)
    %c: i1 = and %r, 1
    branch %c, body, exit
body:
    call @helper(%env)
    jump exit
exit:
    call @__kmpc_target_deinit()
    ret void
}
"#;

#[test]
fn printed_module_is_stable() {
    let module = parse_module(KERNELS).expect("parse should succeed");
    let once = module.to_string();
    let twice = parse_module(&once).expect("printed module parses").to_string();
    assert_eq!(once, twice);
    assert!(once.contains("define external void @kernel(%0: ptr) {"));
    assert!(once.contains("    branch %2, block_1, block_2"));
}

#[test]
fn use_lists_follow_module_order() {
    let module = parse_module(KERNELS).unwrap();
    let init = module.find_symbol("__kmpc_target_init").unwrap();
    let helper = module.function_by_name("helper").unwrap().uuid;
    let kernel = module.function_by_name("kernel").unwrap().uuid;

    let users: Vec<_> = module.uses_of(init).map(|u| u.function).collect();
    assert_eq!(users, vec![helper, kernel]);

    let deinit = module.find_symbol("__kmpc_target_deinit").unwrap();
    let deinit_uses: Vec<_> = module.uses_of(deinit).collect();
    assert_eq!(deinit_uses.len(), 1);
    assert_eq!(deinit_uses[0].function, kernel);
    assert_eq!(deinit_uses[0].site, UseSite::Instruction(0));
    assert!(deinit_uses[0].is_callee);
}

#[test]
fn symbol_passed_as_value_is_a_use_but_not_a_callee() {
    let module = parse_module(
        r#"
declare void @__kmpc_target_deinit()
declare void @register(ptr)

define void @f() {
entry:
    call @register(@__kmpc_target_deinit)
    ret void
}
"#,
    )
    .unwrap();

    let deinit = module.find_symbol("__kmpc_target_deinit").unwrap();
    let uses: Vec<_> = module.uses_of(deinit).collect();
    assert_eq!(uses.len(), 1);
    assert!(!uses[0].is_callee);
}

#[test]
fn extending_a_module_resolves_existing_symbols() {
    let mut module = Module::new("base");
    extend_module_from_string(&mut module, "declare void @__kmpc_target_deinit()").unwrap();
    extend_module_from_string(
        &mut module,
        r#"
define void @late() {
entry:
    call @__kmpc_target_deinit()
    ret void
}
"#,
    )
    .unwrap();

    let deinit = module.find_symbol("__kmpc_target_deinit").unwrap();
    assert!(matches!(deinit, SymbolRef::Function(_)));
    assert!(!module.use_empty(deinit));
    assert_eq!(module.name, "base");
    module.verify().unwrap();
}
