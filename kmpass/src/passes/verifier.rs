use kmir::modules::Module;
use log::debug;

use crate::{
    analysis::{ModuleAnalysisManager, PreservedAnalyses},
    pass::ModulePass,
    utils::error::KmResult,
};

/// Fails the pipeline when the module is malformed.
#[derive(Debug, Default, Clone, Copy)]
pub struct VerifierPass;

impl ModulePass for VerifierPass {
    fn name(&self) -> &str {
        "verify"
    }

    fn run(
        &mut self,
        module: &mut Module,
        _mam: &mut ModuleAnalysisManager,
    ) -> KmResult<PreservedAnalyses> {
        module.verify()?;
        debug!("Module `{}` verified", module.name);
        Ok(PreservedAnalyses::all())
    }

    fn is_required(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use kmir::modules::{Function, Module};

    use super::*;
    use crate::utils::error::KmError;

    #[test]
    fn duplicate_symbols_fail_verification() {
        let mut module = Module::new("dup");
        module.add_function(Function::new("f", vec![], None));
        module.add_function(Function::new("f", vec![], None));

        let err = VerifierPass
            .run(&mut module, &mut ModuleAnalysisManager::new())
            .unwrap_err();
        assert!(matches!(err, KmError::Verification(e) if e.is_duplicate_symbol()));
    }
}
