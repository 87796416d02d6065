//! OpenMP device runtime functions.
use std::collections::HashMap;

use kmir::{
    modules::{
        Function, Module,
        symbol::{ExternalFunction, FunctionPointer, SymbolRef},
    },
    types::Type,
};
use log::{debug, trace};
use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::{
    magic::NVVM_ANNOTATIONS,
    utils::error::{KmError, KmResult},
};

/// Runtime functions known to the builder. The display form is the symbol
/// name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum RuntimeFunction {
    /// `i32 __kmpc_target_init(ptr kernel_environment, ptr launch_environment)`
    #[strum(serialize = "__kmpc_target_init")]
    TargetInit,
    /// `void __kmpc_target_deinit()`
    #[strum(serialize = "__kmpc_target_deinit")]
    TargetDeinit,
    #[strum(serialize = "__kmpc_global_thread_num")]
    GlobalThreadNum,
    #[strum(serialize = "__kmpc_barrier")]
    Barrier,
}

impl RuntimeFunction {
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn param_types(self) -> Vec<Type> {
        match self {
            RuntimeFunction::TargetInit => vec![Type::Ptr, Type::Ptr],
            RuntimeFunction::TargetDeinit => vec![],
            RuntimeFunction::GlobalThreadNum => vec![Type::Ptr],
            RuntimeFunction::Barrier => vec![Type::Ptr, Type::I32],
        }
    }

    pub fn return_type(self) -> Option<Type> {
        match self {
            RuntimeFunction::TargetInit | RuntimeFunction::GlobalThreadNum => Some(Type::I32),
            RuntimeFunction::TargetDeinit | RuntimeFunction::Barrier => None,
        }
    }

    fn matches(self, param_types: &[Type], return_type: Option<Type>) -> bool {
        self.param_types() == param_types && self.return_type() == return_type
    }
}

/// A resolved reference to a runtime function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCallee {
    pub callee: FunctionPointer,
    pub param_types: Vec<Type>,
    pub return_type: Option<Type>,
}

/// Resolves runtime functions in a module, declaring the missing ones.
pub struct OpenMPIRBuilder<'m> {
    module: &'m mut Module,
    cache: HashMap<RuntimeFunction, FunctionCallee>,
    initialized: bool,
}

impl<'m> OpenMPIRBuilder<'m> {
    pub fn new(module: &'m mut Module) -> Self {
        Self {
            module,
            cache: HashMap::new(),
            initialized: false,
        }
    }

    /// Record the runtime functions the module already defines or declares.
    /// Symbols whose signature does not match are left for
    /// [`Self::get_or_create_runtime_function`] to report.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        for id in RuntimeFunction::iter() {
            if let Ok(Some(callee)) = self.lookup(id) {
                trace!("Found runtime function {}", id);
                self.cache.insert(id, callee);
            }
        }
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn lookup(&self, id: RuntimeFunction) -> KmResult<Option<FunctionCallee>> {
        let mismatch = || KmError::RuntimeFunctionMismatch {
            name: id.name().to_string(),
        };

        let (callee, param_types, return_type) = match self.module.find_symbol(id.name()) {
            None => return Ok(None),
            Some(SymbolRef::Global(_)) => return Err(mismatch()),
            Some(SymbolRef::Function(ptr)) => match ptr {
                FunctionPointer::Internal(uuid) => {
                    let func = self.module.get_function(uuid).ok_or_else(mismatch)?;
                    let params: Vec<Type> = func.params.iter().map(|(_, ty)| *ty).collect();
                    (ptr, params, func.return_type)
                }
                FunctionPointer::External(uuid) => {
                    let ext = self.module.get_external_function(uuid).ok_or_else(mismatch)?;
                    (ptr, ext.param_types.clone(), ext.return_type)
                }
            },
        };

        if !id.matches(&param_types, return_type) {
            return Err(mismatch());
        }
        Ok(Some(FunctionCallee {
            callee,
            param_types,
            return_type,
        }))
    }

    /// Callee for `id`. When the module has no symbol of that name, a
    /// declaration is added.
    pub fn get_or_create_runtime_function(&mut self, id: RuntimeFunction) -> KmResult<FunctionCallee> {
        if let Some(callee) = self.cache.get(&id) {
            return Ok(callee.clone());
        }

        let callee = match self.lookup(id)? {
            Some(callee) => callee,
            None => {
                let ext = ExternalFunction::new(id.name(), id.param_types(), id.return_type());
                debug!("Declaring runtime function {}", ext);
                let callee = self.module.add_external_function(ext);
                FunctionCallee {
                    callee,
                    param_types: id.param_types(),
                    return_type: id.return_type(),
                }
            }
        };

        self.cache.insert(id, callee.clone());
        Ok(callee)
    }
}

/// Functions listed as `{@fn, "kernel", 1}` in the `nvvm.annotations` named
/// metadata, in metadata order.
pub fn device_kernels(module: &Module) -> Vec<&Function> {
    let Some(annotations) = module.get_named_metadata(NVVM_ANNOTATIONS) else {
        return Vec::new();
    };

    let mut kernels: Vec<&Function> = Vec::new();
    for node in &annotations.operands {
        let [target, kind, value] = node.0.as_slice() else {
            continue;
        };
        if kind.as_str() != Some("kernel") || value.as_int() != Some(1) {
            continue;
        }
        let Some(FunctionPointer::Internal(uuid)) = target.as_function() else {
            continue;
        };
        if let Some(func) = module.get_function(uuid)
            && !kernels.iter().any(|k| k.uuid == func.uuid)
        {
            kernels.push(func);
        }
    }
    kernels
}
