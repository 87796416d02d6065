//! New pass manager.
use std::sync::Arc;

use kmir::modules::Module;
use libloading::Library;
use log::{debug, info};

use crate::{
    analysis::{ModuleAnalysisManager, PreservedAnalyses},
    utils::error::KmResult,
};

/// A transformation or check over a whole module.
pub trait ModulePass {
    /// Name used in log messages and pipeline listings.
    fn name(&self) -> &str;

    /// Run the pass. The returned set tells the manager which cached analyses
    /// are still valid.
    fn run(
        &mut self,
        module: &mut Module,
        mam: &mut ModuleAnalysisManager,
    ) -> KmResult<PreservedAnalyses>;

    /// Required passes run even on modules whose functions are all `optnone`.
    fn is_required(&self) -> bool {
        false
    }
}

/// Ordered list of module passes.
#[derive(Default)]
pub struct ModulePassManager {
    passes: Vec<Box<dyn ModulePass>>,
    /// SAFETY: Passes created by a plugin must be dropped before the plugin
    /// library is unloaded.
    ///
    /// DO NOT CHANGE THE ORDER OF FIELDS!
    libraries: Vec<Arc<Library>>,
}

impl ModulePassManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pass<P: ModulePass + 'static>(&mut self, pass: P) {
        self.add_boxed_pass(Box::new(pass));
    }

    pub fn add_boxed_pass(&mut self, pass: Box<dyn ModulePass>) {
        debug!("Adding pass {} to pipeline", pass.name());
        self.passes.push(pass);
    }

    /// Keep `library` loaded for as long as this manager lives.
    pub fn retain_library(&mut self, library: Arc<Library>) {
        if !self.libraries.iter().any(|lib| Arc::ptr_eq(lib, &library)) {
            self.libraries.push(library);
        }
    }

    /// Append every pass of `other` after the passes of `self`.
    pub fn append(&mut self, mut other: ModulePassManager) {
        self.passes.append(&mut other.passes);
        for library in other.libraries.drain(..) {
            self.retain_library(library);
        }
    }

    pub fn pass_names(&self) -> impl Iterator<Item = &str> {
        self.passes.iter().map(|pass| pass.name())
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run every pass in order over `module`.
    ///
    /// Optional passes are skipped when the module is `optnone`. After each
    /// pass, analyses it did not preserve are dropped from `mam`. The result
    /// is the intersection of what every pass preserved.
    pub fn run(
        &mut self,
        module: &mut Module,
        mam: &mut ModuleAnalysisManager,
    ) -> KmResult<PreservedAnalyses> {
        let mut preserved = PreservedAnalyses::all();

        for pass in &mut self.passes {
            if !pass.is_required() && module.is_optnone() {
                info!(
                    "Skipping pass {} on optnone module `{}`",
                    pass.name(),
                    module.name
                );
                continue;
            }

            debug!("Running pass {} on module `{}`", pass.name(), module.name);
            let result = pass.run(module, mam)?;
            mam.invalidate(&result);
            preserved.intersect(result);
        }

        Ok(preserved)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kmir::modules::{Function, attributes::AttrKind};
    use parking_lot::Mutex;

    use super::*;
    use crate::analysis::CallGraphAnalysis;

    struct Recorder {
        name: &'static str,
        required: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ModulePass for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn run(
            &mut self,
            _module: &mut Module,
            _mam: &mut ModuleAnalysisManager,
        ) -> KmResult<PreservedAnalyses> {
            self.log.lock().push(self.name);
            Ok(PreservedAnalyses::none())
        }

        fn is_required(&self) -> bool {
            self.required
        }
    }

    fn optnone_module() -> Module {
        let mut module = Module::new("m");
        let mut func = Function::new("f", vec![], None);
        func.attributes.add_kind(AttrKind::OptNone);
        module.add_function(func);
        module
    }

    #[test]
    fn optional_passes_are_skipped_on_optnone_modules() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut mpm = ModulePassManager::new();
        mpm.add_pass(Recorder {
            name: "optional",
            required: false,
            log: log.clone(),
        });
        mpm.add_pass(Recorder {
            name: "required",
            required: true,
            log: log.clone(),
        });

        let mut module = optnone_module();
        mpm.run(&mut module, &mut ModuleAnalysisManager::new())
            .unwrap();
        assert_eq!(*log.lock(), vec!["required"]);

        let mut plain = Module::new("plain");
        plain.add_function(Function::new("g", vec![], None));
        mpm.run(&mut plain, &mut ModuleAnalysisManager::new())
            .unwrap();
        assert_eq!(*log.lock(), vec!["required", "optional", "required"]);
    }

    #[test]
    fn modifying_pass_invalidates_cached_analyses() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut mpm = ModulePassManager::new();
        mpm.add_pass(Recorder {
            name: "modify",
            required: true,
            log,
        });

        let mut module = optnone_module();
        let mut mam = ModuleAnalysisManager::new();
        mam.get_result::<CallGraphAnalysis>(&module);

        let preserved = mpm.run(&mut module, &mut mam).unwrap();
        assert!(!preserved.are_all_preserved());
        assert!(mam.get_cached_result::<CallGraphAnalysis>().is_none());
    }

    #[test]
    fn empty_manager_preserves_everything() {
        let mut mpm = ModulePassManager::new();
        let preserved = mpm
            .run(&mut Module::new("m"), &mut ModuleAnalysisManager::new())
            .unwrap();
        assert!(preserved.are_all_preserved());
        assert!(mpm.is_empty());
    }
}
