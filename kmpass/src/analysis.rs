//! Module analyses and their invalidation.
use std::{
    any::TypeId,
    collections::{HashMap, HashSet},
};

use downcast_rs::{DowncastSync, impl_downcast};
use kmir::modules::{Module, symbol::FunctionPointer};
use log::{debug, trace};
use petgraph::prelude::DiGraphMap;

/// Type-erased result of an analysis, stored in a [`ModuleAnalysisManager`].
pub trait AnalysisResult: DowncastSync {}
impl_downcast!(sync AnalysisResult);

impl<T: Send + Sync + 'static> AnalysisResult for T {}

/// A read-only computation over a module whose result can be cached until a
/// pass invalidates it.
pub trait Analysis: Default + 'static {
    type Result: Send + Sync + 'static;

    /// Name used in log messages.
    const NAME: &'static str;

    fn run(&self, module: &Module) -> Self::Result;
}

/// Set of analyses a pass left valid after it ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreservedAnalyses {
    all: bool,
    preserved: HashSet<TypeId>,
}

impl PreservedAnalyses {
    /// The pass did not modify anything.
    pub fn all() -> Self {
        Self {
            all: true,
            preserved: HashSet::new(),
        }
    }

    /// Every cached analysis must be recomputed.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn preserve<A: Analysis>(&mut self) -> &mut Self {
        if !self.all {
            self.preserved.insert(TypeId::of::<A>());
        }
        self
    }

    pub fn is_preserved<A: Analysis>(&self) -> bool {
        self.is_preserved_id(TypeId::of::<A>())
    }

    fn is_preserved_id(&self, id: TypeId) -> bool {
        self.all || self.preserved.contains(&id)
    }

    pub fn are_all_preserved(&self) -> bool {
        self.all
    }

    /// Keep only what both `self` and `other` preserve.
    pub fn intersect(&mut self, other: PreservedAnalyses) {
        if other.all {
            return;
        }
        if self.all {
            *self = other;
            return;
        }
        self.preserved.retain(|id| other.preserved.contains(id));
    }
}

/// Cache of analysis results for a single module.
#[derive(Default)]
pub struct ModuleAnalysisManager {
    results: HashMap<TypeId, (&'static str, Box<dyn AnalysisResult>)>,
}

impl ModuleAnalysisManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result of `A` on `module`, computed on first request.
    pub fn get_result<A: Analysis>(&mut self, module: &Module) -> &A::Result {
        let (_, result) = self.results.entry(TypeId::of::<A>()).or_insert_with(|| {
            debug!("Running analysis {} on module `{}`", A::NAME, module.name);
            let result: Box<dyn AnalysisResult> = Box::new(A::default().run(module));
            (A::NAME, result)
        });

        result
            .downcast_ref::<A::Result>()
            .expect("Invalid analysis result type")
    }

    /// Result of `A` if it is cached and still valid.
    pub fn get_cached_result<A: Analysis>(&self) -> Option<&A::Result> {
        self.results
            .get(&TypeId::of::<A>())
            .and_then(|(_, result)| result.downcast_ref::<A::Result>())
    }

    /// Drop every cached result not listed in `preserved`.
    pub fn invalidate(&mut self, preserved: &PreservedAnalyses) {
        self.results.retain(|id, (name, _)| {
            let keep = preserved.is_preserved_id(*id);
            if !keep {
                trace!("Invalidating analysis {}", name);
            }
            keep
        });
    }

    pub fn clear(&mut self) {
        self.results.clear();
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Direct call edges between the functions of a module.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallGraphAnalysis;

impl Analysis for CallGraphAnalysis {
    type Result = DiGraphMap<FunctionPointer, ()>;

    const NAME: &'static str = "call-graph";

    fn run(&self, module: &Module) -> Self::Result {
        let mut graph = DiGraphMap::new();
        for func in &module.functions {
            let caller = graph.add_node(func.pointer());
            for callee in func.direct_callees() {
                graph.add_edge(caller, callee, ());
            }
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use kmir::modules::parser::parse_module;

    use super::*;

    #[derive(Default)]
    struct FunctionCount;

    impl Analysis for FunctionCount {
        type Result = usize;
        const NAME: &'static str = "function-count";

        fn run(&self, module: &Module) -> usize {
            module.functions.len()
        }
    }

    fn sample() -> Module {
        parse_module(
            r#"
declare void @ext()

define void @a() {
entry:
    call @b()
    call @ext()
    ret void
}

define void @b() {
entry:
    ret void
}
"#,
        )
        .unwrap()
    }

    #[test]
    fn results_are_cached_until_invalidated() {
        let mut module = sample();
        let mut mam = ModuleAnalysisManager::new();

        assert_eq!(*mam.get_result::<FunctionCount>(&module), 2);
        module.functions.pop();
        assert_eq!(*mam.get_result::<FunctionCount>(&module), 2);

        mam.invalidate(&PreservedAnalyses::none());
        assert!(mam.get_cached_result::<FunctionCount>().is_none());
        assert_eq!(*mam.get_result::<FunctionCount>(&module), 1);
    }

    #[test]
    fn preserved_analyses_survive_invalidation() {
        let module = sample();
        let mut mam = ModuleAnalysisManager::new();
        mam.get_result::<FunctionCount>(&module);
        mam.get_result::<CallGraphAnalysis>(&module);

        let mut pa = PreservedAnalyses::none();
        pa.preserve::<FunctionCount>();
        mam.invalidate(&pa);

        assert!(mam.get_cached_result::<FunctionCount>().is_some());
        assert!(mam.get_cached_result::<CallGraphAnalysis>().is_none());
        assert_eq!(mam.len(), 1);
    }

    #[test]
    fn intersection_keeps_common_analyses() {
        let mut all = PreservedAnalyses::all();
        let mut some = PreservedAnalyses::none();
        some.preserve::<FunctionCount>();

        all.intersect(some.clone());
        assert!(all.is_preserved::<FunctionCount>());
        assert!(!all.is_preserved::<CallGraphAnalysis>());

        all.intersect(PreservedAnalyses::none());
        assert!(!all.is_preserved::<FunctionCount>());
        assert!(PreservedAnalyses::all().is_preserved::<CallGraphAnalysis>());
    }

    #[test]
    fn call_graph_has_direct_edges() {
        let module = sample();
        let graph = CallGraphAnalysis.run(&module);
        let a = module.function_by_name("a").unwrap().pointer();
        let b = module.function_by_name("b").unwrap().pointer();

        assert!(graph.contains_edge(a, b));
        assert!(!graph.contains_edge(b, a));
        assert_eq!(graph.neighbors(a).count(), 2);
    }
}
