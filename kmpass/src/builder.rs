//! Pipeline construction: extension points and textual pipelines.
//!
//! Plugins never see a pipeline directly. They register callbacks on a
//! [`PassBuilder`]; the host then asks the builder for a default pipeline
//! (extension-point callbacks fire at their position) or for a pipeline
//! described as text such as `verify,amdgpu-attribute<kernel=foo>,print`
//! (parsing callbacks are asked to recognise names the builder does not know).
use std::sync::Arc;

use libloading::Library;
use log::{debug, trace};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    pass::ModulePassManager,
    passes::{PrintModulePass, VerifierPass},
    utils::error::{KmError, KmResult},
};

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, EnumIter,
)]
pub enum OptimizationLevel {
    #[strum(serialize = "O0")]
    O0,
    #[strum(serialize = "O1")]
    O1,
    #[default]
    #[strum(serialize = "O2")]
    O2,
    #[strum(serialize = "O3")]
    O3,
}

/// Positions in the default pipeline where plugins may insert passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum ExtensionPoint {
    /// Before anything else runs.
    PipelineStart,
    PipelineEarlySimplification,
    /// After every optimization.
    OptimizerLast,
}

pub type ExtensionPointCallback = Box<dyn Fn(&mut ModulePassManager, OptimizationLevel)>;

/// Receives a pass name and its parameter text (empty when absent). Returns
/// `Ok(true)` after adding the pass, `Ok(false)` when the name is not its own.
pub type PipelineParsingCallback = Box<dyn Fn(&str, &str, &mut ModulePassManager) -> KmResult<bool>>;

#[derive(Default)]
pub struct PassBuilder {
    ep_callbacks: Vec<(ExtensionPoint, ExtensionPointCallback)>,
    parsing_callbacks: Vec<PipelineParsingCallback>,
    /// SAFETY: Callbacks registered by a plugin must be dropped before the
    /// plugin library is unloaded.
    ///
    /// DO NOT CHANGE THE ORDER OF FIELDS!
    libraries: Vec<Arc<Library>>,
}

impl PassBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_extension_point_callback(
        &mut self,
        ep: ExtensionPoint,
        callback: impl Fn(&mut ModulePassManager, OptimizationLevel) + 'static,
    ) {
        trace!("Registering callback at extension point {}", ep);
        self.ep_callbacks.push((ep, Box::new(callback)));
    }

    pub fn register_pipeline_start_ep_callback(
        &mut self,
        callback: impl Fn(&mut ModulePassManager, OptimizationLevel) + 'static,
    ) {
        self.register_extension_point_callback(ExtensionPoint::PipelineStart, callback);
    }

    pub fn register_optimizer_last_ep_callback(
        &mut self,
        callback: impl Fn(&mut ModulePassManager, OptimizationLevel) + 'static,
    ) {
        self.register_extension_point_callback(ExtensionPoint::OptimizerLast, callback);
    }

    pub fn register_pipeline_parsing_callback(
        &mut self,
        callback: impl Fn(&str, &str, &mut ModulePassManager) -> KmResult<bool> + 'static,
    ) {
        self.parsing_callbacks.push(Box::new(callback));
    }

    /// Keep `library` loaded for as long as this builder, or any pipeline it
    /// builds, lives.
    pub fn retain_library(&mut self, library: Arc<Library>) {
        if !self.libraries.iter().any(|lib| Arc::ptr_eq(lib, &library)) {
            self.libraries.push(library);
        }
    }

    fn new_pass_manager(&self) -> ModulePassManager {
        let mut mpm = ModulePassManager::new();
        for library in &self.libraries {
            mpm.retain_library(library.clone());
        }
        mpm
    }

    fn invoke_extension_point(
        &self,
        ep: ExtensionPoint,
        mpm: &mut ModulePassManager,
        level: OptimizationLevel,
    ) {
        for (_, callback) in self.ep_callbacks.iter().filter(|(at, _)| *at == ep) {
            callback(mpm, level);
        }
    }

    /// Pipeline made of every extension-point callback, in extension-point
    /// order, then registration order.
    pub fn build_per_module_default_pipeline(&self, level: OptimizationLevel) -> ModulePassManager {
        debug!("Building default module pipeline at {}", level);
        let mut mpm = self.new_pass_manager();
        self.invoke_extension_point(ExtensionPoint::PipelineStart, &mut mpm, level);
        self.invoke_extension_point(ExtensionPoint::PipelineEarlySimplification, &mut mpm, level);
        self.invoke_extension_point(ExtensionPoint::OptimizerLast, &mut mpm, level);
        mpm
    }

    /// Parse a comma separated pass list. Each entry is a pass name optionally
    /// followed by `<params>`.
    pub fn parse_pass_pipeline(&self, pipeline: &str) -> KmResult<ModulePassManager> {
        let mut mpm = self.new_pass_manager();

        for element in split_pipeline(pipeline)? {
            let (name, params) = split_params(pipeline, element)?;
            self.add_pass_by_name(&mut mpm, name, params)?;
        }

        Ok(mpm)
    }

    fn add_pass_by_name(
        &self,
        mpm: &mut ModulePassManager,
        name: &str,
        params: &str,
    ) -> KmResult<()> {
        match name {
            "verify" | "print" if !params.is_empty() => {
                return Err(KmError::InvalidPassParameter {
                    pass: name.to_string(),
                    param: params.to_string(),
                });
            }
            "verify" => {
                mpm.add_pass(VerifierPass);
                return Ok(());
            }
            "print" => {
                mpm.add_pass(PrintModulePass::stdout());
                return Ok(());
            }
            _ => {}
        }

        for callback in &self.parsing_callbacks {
            if callback(name, params, mpm)? {
                trace!("Pass `{}` provided by a parsing callback", name);
                return Ok(());
            }
        }

        Err(KmError::UnknownPass(name.to_string()))
    }
}

fn invalid(pipeline: &str, reason: impl Into<String>) -> KmError {
    KmError::InvalidPipeline {
        pipeline: pipeline.to_string(),
        reason: reason.into(),
    }
}

/// Split on the commas that are not nested inside `<...>`.
fn split_pipeline(pipeline: &str) -> KmResult<Vec<&str>> {
    let mut elements = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in pipeline.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| invalid(pipeline, "unbalanced `>`"))?;
            }
            ',' if depth == 0 => {
                elements.push(pipeline[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(invalid(pipeline, "unbalanced `<`"));
    }
    elements.push(pipeline[start..].trim());

    if elements.iter().any(|element| element.is_empty()) {
        return Err(invalid(pipeline, "empty pass name"));
    }
    Ok(elements)
}

fn split_params<'a>(pipeline: &str, element: &'a str) -> KmResult<(&'a str, &'a str)> {
    match element.find('<') {
        None => Ok((element, "")),
        Some(open) => {
            let params = element[open + 1..]
                .strip_suffix('>')
                .ok_or_else(|| invalid(pipeline, format!("trailing text after `{}`", element)))?;
            let name = element[..open].trim();
            if name.is_empty() {
                return Err(invalid(pipeline, "empty pass name"));
            }
            Ok((name, params))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use kmir::modules::Module;

    use super::*;
    use crate::{
        analysis::{ModuleAnalysisManager, PreservedAnalyses},
        pass::ModulePass,
    };

    struct Named(String);

    impl ModulePass for Named {
        fn name(&self) -> &str {
            &self.0
        }

        fn run(
            &mut self,
            _module: &mut Module,
            _mam: &mut ModuleAnalysisManager,
        ) -> KmResult<PreservedAnalyses> {
            Ok(PreservedAnalyses::all())
        }
    }

    #[test]
    fn extension_points_run_in_pipeline_order() {
        let mut pb = PassBuilder::new();
        pb.register_optimizer_last_ep_callback(|mpm, _| mpm.add_pass(Named("last".into())));
        pb.register_pipeline_start_ep_callback(|mpm, _| mpm.add_pass(Named("start".into())));

        let mpm = pb.build_per_module_default_pipeline(OptimizationLevel::O2);
        assert_eq!(mpm.pass_names().collect::<Vec<_>>(), vec!["start", "last"]);
    }

    #[test]
    fn level_is_forwarded_to_callbacks() {
        let seen = Rc::new(RefCell::new(None));
        let mut pb = PassBuilder::new();
        let sink = seen.clone();
        pb.register_pipeline_start_ep_callback(move |_, level| *sink.borrow_mut() = Some(level));

        pb.build_per_module_default_pipeline(OptimizationLevel::O3);
        assert_eq!(*seen.borrow(), Some(OptimizationLevel::O3));
    }

    #[test]
    fn textual_pipeline_uses_builtins_and_callbacks() {
        let mut pb = PassBuilder::new();
        pb.register_pipeline_parsing_callback(|name, params, mpm| {
            if name != "custom" {
                return Ok(false);
            }
            mpm.add_pass(Named(format!("custom[{}]", params)));
            Ok(true)
        });

        let mpm = pb
            .parse_pass_pipeline("verify, custom<a=1;b=<2>>, custom")
            .unwrap();
        assert_eq!(
            mpm.pass_names().collect::<Vec<_>>(),
            vec!["verify", "custom[a=1;b=<2>]", "custom[]"]
        );
    }

    #[test]
    fn malformed_pipelines_are_rejected() {
        let pb = PassBuilder::new();
        assert!(matches!(
            pb.parse_pass_pipeline("nope"),
            Err(KmError::UnknownPass(name)) if name == "nope"
        ));
        assert!(matches!(
            pb.parse_pass_pipeline("verify,,print"),
            Err(KmError::InvalidPipeline { .. })
        ));
        assert!(matches!(
            pb.parse_pass_pipeline("verify<x"),
            Err(KmError::InvalidPipeline { .. })
        ));
        assert!(matches!(
            pb.parse_pass_pipeline("verify<x>"),
            Err(KmError::InvalidPassParameter { .. })
        ));
    }

    #[test]
    fn optimization_level_parses_from_text() {
        assert_eq!("O0".parse::<OptimizationLevel>().unwrap(), OptimizationLevel::O0);
        assert_eq!(OptimizationLevel::default().to_string(), "O2");
    }
}
