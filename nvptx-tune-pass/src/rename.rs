//! PTX symbol names may not contain `.`; replace it with `_` in every global
//! variable and non-intrinsic function name.
use kmir::modules::{Module, symbol::INTRINSIC_PREFIX};
use kmpass::{
    ModuleAnalysisManager, PreservedAnalyses, legacy, pass::ModulePass, utils::error::KmResult,
};
use log::debug;

use crate::{RENAME_LEGACY_PASS_ARG, RENAME_PIPELINE_NAME};

fn sanitize(name: &str) -> String {
    name.replace('.', "_")
}

/// First name derived from `base` that no symbol of `module` carries.
fn unique_name(module: &Module, base: String) -> String {
    if module.is_symbol_name_free(&base) {
        return base;
    }
    let mut suffix = 1usize;
    loop {
        let candidate = format!("{}_{}", base, suffix);
        if module.is_symbol_name_free(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

enum Slot {
    Global(usize),
    Function(usize),
    External(usize),
}

/// Rename symbols whose names contain `.`. Returns the `(old, new)` pairs in
/// the order globals, defined functions, declarations.
///
/// Symbols are referenced by uuid, so renaming never invalidates a use.
pub fn rename_global_symbols(module: &mut Module) -> Vec<(String, String)> {
    let mut pending = Vec::new();
    pending.extend(
        module
            .globals
            .iter()
            .enumerate()
            .map(|(i, g)| (Slot::Global(i), g.name.clone())),
    );
    pending.extend(
        module
            .functions
            .iter()
            .enumerate()
            .map(|(i, f)| (Slot::Function(i), f.name.clone())),
    );
    pending.extend(
        module
            .external_functions
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_intrinsic())
            .map(|(i, f)| (Slot::External(i), f.name.clone())),
    );

    let mut renamed = Vec::new();
    for (slot, old) in pending {
        if !old.contains('.') || old.starts_with(INTRINSIC_PREFIX) {
            continue;
        }

        let new = unique_name(module, sanitize(&old));
        match slot {
            Slot::Global(i) => module.globals[i].name = new.clone(),
            Slot::Function(i) => module.functions[i].name = new.clone(),
            Slot::External(i) => module.external_functions[i].name = new.clone(),
        }
        debug!("Renamed `{}` to `{}`", old, new);
        renamed.push((old, new));
    }
    renamed
}

#[derive(Debug, Default)]
pub struct GlobalSymbolRenamePass;

impl ModulePass for GlobalSymbolRenamePass {
    fn name(&self) -> &str {
        RENAME_PIPELINE_NAME
    }

    fn run(
        &mut self,
        module: &mut Module,
        _mam: &mut ModuleAnalysisManager,
    ) -> KmResult<PreservedAnalyses> {
        rename_global_symbols(module);
        Ok(PreservedAnalyses::none())
    }

    fn is_required(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct LegacyGlobalSymbolRenamePass;

impl legacy::ModulePass for LegacyGlobalSymbolRenamePass {
    fn name(&self) -> &str {
        RENAME_LEGACY_PASS_ARG
    }

    fn run_on_module(&mut self, module: &mut Module) -> KmResult<bool> {
        rename_global_symbols(module);
        Ok(true)
    }
}
