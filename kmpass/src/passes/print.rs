use std::io::Write;

use kmir::modules::Module;

use crate::{
    analysis::{ModuleAnalysisManager, PreservedAnalyses},
    pass::ModulePass,
    utils::error::KmResult,
};

/// Writes the textual form of the module.
pub struct PrintModulePass {
    out: Box<dyn Write>,
}

impl PrintModulePass {
    pub fn new(out: Box<dyn Write>) -> Self {
        Self { out }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl ModulePass for PrintModulePass {
    fn name(&self) -> &str {
        "print"
    }

    fn run(
        &mut self,
        module: &mut Module,
        _mam: &mut ModuleAnalysisManager,
    ) -> KmResult<PreservedAnalyses> {
        write!(self.out, "{}", module)?;
        self.out.flush()?;
        Ok(PreservedAnalyses::all())
    }

    fn is_required(&self) -> bool {
        true
    }
}
