//! Legacy pass manager.
//!
//! Legacy passes are looked up by their command-line argument in a
//! [`PassRegistry`] and report whether they modified the module.
use std::{collections::BTreeMap, sync::Arc};

use kmir::modules::Module;
use libloading::Library;
use log::{debug, trace};

use crate::utils::error::{KmError, KmResult};

pub trait ModulePass {
    fn name(&self) -> &str;

    /// Returns `true` if the module was modified.
    fn run_on_module(&mut self, module: &mut Module) -> KmResult<bool>;
}

/// Static description of a registered legacy pass.
#[derive(Debug, Clone, Copy)]
pub struct PassInfo {
    /// Command-line argument selecting the pass.
    pub arg: &'static str,
    /// Human readable name.
    pub name: &'static str,
    /// The pass only looks at the control flow graph.
    pub cfg_only: bool,
    pub is_analysis: bool,
    ctor: fn() -> Box<dyn ModulePass>,
}

impl PassInfo {
    pub fn new<P: ModulePass + Default + 'static>(
        arg: &'static str,
        name: &'static str,
        cfg_only: bool,
        is_analysis: bool,
    ) -> Self {
        fn construct<P: ModulePass + Default + 'static>() -> Box<dyn ModulePass> {
            Box::new(P::default())
        }

        Self {
            arg,
            name,
            cfg_only,
            is_analysis,
            ctor: construct::<P>,
        }
    }

    pub fn create_pass(&self) -> Box<dyn ModulePass> {
        (self.ctor)()
    }
}

#[derive(Default)]
pub struct PassRegistry {
    passes: BTreeMap<&'static str, PassInfo>,
    /// SAFETY: Must outlive any constructor registered from a plugin.
    ///
    /// DO NOT CHANGE THE ORDER OF FIELDS!
    libraries: Vec<Arc<Library>>,
}

impl PassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_pass(&mut self, info: PassInfo) -> KmResult<()> {
        if self.passes.contains_key(info.arg) {
            return Err(KmError::DuplicatePass(info.arg.to_string()));
        }
        trace!("Registered legacy pass `{}` ({})", info.arg, info.name);
        self.passes.insert(info.arg, info);
        Ok(())
    }

    pub fn get_pass_info(&self, arg: &str) -> Option<&PassInfo> {
        self.passes.get(arg)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PassInfo> {
        self.passes.values()
    }

    pub fn retain_library(&mut self, library: Arc<Library>) {
        if !self.libraries.iter().any(|lib| Arc::ptr_eq(lib, &library)) {
            self.libraries.push(library);
        }
    }
}

#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn ModulePass>>,
    /// DO NOT CHANGE THE ORDER OF FIELDS!
    libraries: Vec<Arc<Library>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pass: Box<dyn ModulePass>) {
        self.passes.push(pass);
    }

    /// Instantiate the pass registered under `arg` and append it.
    pub fn add_by_arg(&mut self, registry: &PassRegistry, arg: &str) -> KmResult<()> {
        let info = registry
            .get_pass_info(arg)
            .ok_or_else(|| KmError::UnknownPass(arg.to_string()))?;
        for library in &registry.libraries {
            if !self.libraries.iter().any(|lib| Arc::ptr_eq(lib, library)) {
                self.libraries.push(library.clone());
            }
        }
        self.add(info.create_pass());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run every pass; returns `true` if any of them modified the module.
    pub fn run(&mut self, module: &mut Module) -> KmResult<bool> {
        let mut changed = false;
        for pass in &mut self.passes {
            debug!("Running legacy pass {} on module `{}`", pass.name(), module.name);
            changed |= pass.run_on_module(module)?;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use kmir::modules::Function;

    use super::*;

    #[derive(Default)]
    struct AddFunction;

    impl ModulePass for AddFunction {
        fn name(&self) -> &str {
            "add-function"
        }

        fn run_on_module(&mut self, module: &mut Module) -> KmResult<bool> {
            module.add_function(Function::new("added", vec![], None));
            Ok(true)
        }
    }

    #[derive(Default)]
    struct Nothing;

    impl ModulePass for Nothing {
        fn name(&self) -> &str {
            "nothing"
        }

        fn run_on_module(&mut self, _module: &mut Module) -> KmResult<bool> {
            Ok(false)
        }
    }

    #[test]
    fn registry_resolves_passes_by_argument() {
        let mut registry = PassRegistry::new();
        registry
            .register_pass(PassInfo::new::<AddFunction>("add-fn", "Add Function", false, false))
            .unwrap();
        registry
            .register_pass(PassInfo::new::<Nothing>("nothing", "Nothing", true, true))
            .unwrap();

        let info = registry.get_pass_info("nothing").unwrap();
        assert!(info.cfg_only && info.is_analysis);
        assert_eq!(registry.iter().count(), 2);

        let mut pm = PassManager::new();
        pm.add_by_arg(&registry, "nothing").unwrap();
        let mut module = Module::new("m");
        assert!(!pm.run(&mut module).unwrap());

        pm.add_by_arg(&registry, "add-fn").unwrap();
        assert!(pm.run(&mut module).unwrap());
        assert_eq!(module.functions.len(), 1);
    }

    #[test]
    fn duplicate_and_unknown_arguments_are_errors() {
        let mut registry = PassRegistry::new();
        let info = PassInfo::new::<Nothing>("nothing", "Nothing", false, false);
        registry.register_pass(info).unwrap();
        assert!(matches!(
            registry.register_pass(info),
            Err(KmError::DuplicatePass(arg)) if arg == "nothing"
        ));
        assert!(matches!(
            PassManager::new().add_by_arg(&registry, "missing"),
            Err(KmError::UnknownPass(_))
        ));
    }
}
