//! Kernel entry detection and annotation.
//!
//! A kernel entry is a function whose own body uses both
//! `__kmpc_target_init` and `__kmpc_target_deinit`. Uses inside functions it
//! calls do not count.
use std::{collections::HashSet, io::Write};

use kmir::modules::{Module, symbol::FunctionPointer};
use kmpass::{
    openmp::{OpenMPIRBuilder, RuntimeFunction},
    utils::error::KmResult,
};
use log::debug;
use uuid::Uuid;

use crate::options::AmdgpuAttributeOptions;

/// Attribute marking a detected kernel entry.
pub const KERNEL_ENTRY_ATTRIBUTE: &str = "amdgpu-kernel-entry";

/// Functions found during one run, in module order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KernelEntrySet {
    entries: Vec<Uuid>,
}

impl KernelEntrySet {
    /// Functions using both `init` and `deinit` directly.
    pub fn collect(module: &Module, init: FunctionPointer, deinit: FunctionPointer) -> Self {
        let init_users: HashSet<Uuid> = module.function_uses(init).map(|u| u.function).collect();
        let deinit_users: HashSet<Uuid> =
            module.function_uses(deinit).map(|u| u.function).collect();

        let entries = module
            .functions
            .iter()
            .map(|func| func.uuid)
            .filter(|uuid| init_users.contains(uuid) && deinit_users.contains(uuid))
            .collect();

        Self { entries }
    }

    pub fn insert(&mut self, uuid: Uuid) -> bool {
        if self.contains(uuid) {
            return false;
        }
        self.entries.push(uuid);
        true
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.entries.contains(&uuid)
    }

    pub fn iter(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the kernel entries of `module`, annotate them and report each one on
/// `out`. Returns the annotated functions.
///
/// The runtime hooks are declared in the module when missing.
pub fn annotate_kernel_entries(
    module: &mut Module,
    options: &AmdgpuAttributeOptions,
    out: &mut dyn Write,
) -> KmResult<KernelEntrySet> {
    let (init, deinit) = {
        let mut omp = OpenMPIRBuilder::new(module);
        omp.initialize();
        (
            omp.get_or_create_runtime_function(RuntimeFunction::TargetInit)?,
            omp.get_or_create_runtime_function(RuntimeFunction::TargetDeinit)?,
        )
    };

    let entries = KernelEntrySet::collect(module, init.callee, deinit.callee);
    debug!(
        "Found {} kernel entry function(s) in module `{}`",
        entries.len(),
        module.name
    );

    let mut annotated = KernelEntrySet::default();
    for uuid in entries.iter() {
        let Some(func) = module.get_function_mut(uuid) else {
            continue;
        };

        if let Some(wanted) = &options.kernel_name
            && func.name != *wanted
        {
            writeln!(out, "Skip {}", func.name)?;
            continue;
        }

        writeln!(out, "Kernel entry function {}", func.name)?;
        func.add_fn_attr(KERNEL_ENTRY_ATTRIBUTE, "");

        for (attr, value) in options.tuning_attributes() {
            writeln!(out, "Set Attribute {} => {}", attr, value)?;
            func.add_fn_attr(attr.key(), value);
        }

        annotated.insert(uuid);
    }

    out.flush()?;
    Ok(annotated)
}
