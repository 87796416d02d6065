//! Pass plugins.
//!
//! A plugin is a dynamic library exporting [`PLUGIN_INFO_FN_NAME`] and,
//! optionally, [`PLUGIN_LEGACY_REGISTER_FN_NAME`]. Both are generated by
//! [`define_pass_plugin!`]. The same records can be handed to
//! [`PassPlugin::from_info`] when the plugin crate is linked statically.
use std::{path::Path, sync::Arc};

use libloading::Library;
use log::{debug, info};
use semver::{Version, VersionReq};

use crate::{
    HOST_VERSION,
    builder::PassBuilder,
    legacy::PassRegistry,
    magic::{PLUGIN_INFO_FN_NAME, PLUGIN_LEGACY_REGISTER_FN_NAME},
    meta::PluginManifest,
    utils::error::{KmError, KmResult},
};

/// Version of the plugin record layout. Plugins built against another
/// version are rejected.
pub const PLUGIN_API_VERSION: u32 = 1;

pub type RegisterPassBuilderCallbacksFn = fn(&mut PassBuilder);

/// Record returned by a plugin's entry point.
#[derive(Debug, Clone, Copy)]
pub struct PassPluginLibraryInfo {
    pub api_version: u32,
    pub plugin_name: &'static str,
    /// Host version the plugin was built against.
    pub plugin_version: &'static str,
    pub register_pass_builder_callbacks: RegisterPassBuilderCallbacksFn,
}

/// Prototype of the plugin entry point. Function name should be [`PLUGIN_INFO_FN_NAME`].
pub type GetPluginInfoFn = unsafe fn() -> PassPluginLibraryInfo;

/// Prototype of the legacy registration function. Function name should be
/// [`PLUGIN_LEGACY_REGISTER_FN_NAME`].
pub type RegisterLegacyPassesFn = unsafe fn(&mut PassRegistry) -> KmResult<()>;

/// Export the plugin entry points of a pass plugin library.
///
/// ```ignore
/// kmpass::define_pass_plugin!(info: my_plugin_info(), legacy: register_legacy_passes);
/// ```
#[macro_export]
macro_rules! define_pass_plugin {
    (
        info: $info:expr
        $(, legacy: $legacy:path )?
        $(,)?
    ) => {
        #[unsafe(no_mangle)]
        pub fn __kmpass_get_plugin_info() -> $crate::plugin::PassPluginLibraryInfo {
            $info
        }

        $(
            #[unsafe(no_mangle)]
            pub fn __kmpass_register_legacy(
                registry: &mut $crate::legacy::PassRegistry,
            ) -> $crate::utils::error::KmResult<()> {
                $legacy(registry)
            }
        )?
    };
}

/// A validated plugin, either loaded from disk or linked in.
pub struct PassPlugin {
    info: PassPluginLibraryInfo,
    register_legacy: Option<RegisterLegacyPassesFn>,
    /// SAFETY: `info` points into the library; it must stay loaded while the
    /// plugin exists.
    ///
    /// DO NOT CHANGE THE ORDER OF FIELDS!
    library: Option<Arc<Library>>,
}

/// Check `info` against the running host.
fn check_compatibility(info: &PassPluginLibraryInfo) -> KmResult<()> {
    if info.api_version != PLUGIN_API_VERSION {
        return Err(KmError::PluginApiMismatch {
            name: info.plugin_name.to_string(),
            expected: PLUGIN_API_VERSION,
            found: info.api_version,
        });
    }

    let req = VersionReq::parse(&format!("^{}", info.plugin_version)).map_err(|e| {
        KmError::InvalidVersion {
            source: e,
            version: info.plugin_version.to_string(),
        }
    })?;
    let host = Version::parse(HOST_VERSION).map_err(|e| KmError::InvalidVersion {
        source: e,
        version: HOST_VERSION.to_string(),
    })?;

    if !req.matches(&host) {
        return Err(KmError::CompatibilityCheckFailed {
            name: info.plugin_name.to_string(),
            version: host,
            req,
        });
    }
    Ok(())
}

impl PassPlugin {
    /// Wrap a plugin record of a statically linked plugin.
    pub fn from_info(
        info: PassPluginLibraryInfo,
        register_legacy: Option<RegisterLegacyPassesFn>,
    ) -> KmResult<Self> {
        check_compatibility(&info)?;
        Ok(Self {
            info,
            register_legacy,
            library: None,
        })
    }

    /// Load a plugin from a dynamic library.
    pub fn load(path: impl AsRef<Path>) -> KmResult<Self> {
        let path = path.as_ref();
        let load_error = |e| KmError::PluginLoad {
            source: e,
            file: path.display().to_string(),
        };

        unsafe {
            let library = Library::new(path).map_err(load_error)?;

            let info_fn: libloading::Symbol<GetPluginInfoFn> = library
                .get(PLUGIN_INFO_FN_NAME.as_bytes())
                .map_err(load_error)?;
            let info = info_fn();
            check_compatibility(&info)?;

            let register_legacy = library
                .get::<RegisterLegacyPassesFn>(PLUGIN_LEGACY_REGISTER_FN_NAME.as_bytes())
                .ok()
                .map(|symbol| *symbol);

            info!(
                "Loaded pass plugin {} (built for {}) from {}",
                info.plugin_name,
                info.plugin_version,
                path.display()
            );

            Ok(Self {
                info,
                register_legacy,
                library: Some(Arc::new(library)),
            })
        }
    }

    /// Load the plugin called `name` in the manifest.
    pub fn load_by_name(manifest: &PluginManifest, name: &str) -> KmResult<Self> {
        let entry = manifest
            .find(name)
            .ok_or_else(|| KmError::PluginNotFound(name.to_string()))?;
        Self::load(&entry.path)
    }

    /// Load every plugin listed in the manifest.
    pub fn load_all(manifest: &PluginManifest) -> KmResult<Vec<Self>> {
        manifest
            .plugin
            .iter()
            .map(|entry| Self::load(&entry.path))
            .collect()
    }

    pub fn name(&self) -> &str {
        self.info.plugin_name
    }

    pub fn version(&self) -> &str {
        self.info.plugin_version
    }

    pub fn api_version(&self) -> u32 {
        self.info.api_version
    }

    pub fn has_legacy_passes(&self) -> bool {
        self.register_legacy.is_some()
    }

    pub fn register_pass_builder_callbacks(&self, pb: &mut PassBuilder) {
        if let Some(library) = &self.library {
            pb.retain_library(library.clone());
        }
        debug!("Registering pass builder callbacks of {}", self.name());
        (self.info.register_pass_builder_callbacks)(pb);
    }

    /// Register the plugin's legacy passes, if it has any.
    pub fn register_legacy_passes(&self, registry: &mut PassRegistry) -> KmResult<()> {
        let Some(register) = self.register_legacy else {
            return Ok(());
        };
        if let Some(library) = &self.library {
            registry.retain_library(library.clone());
        }
        unsafe { register(registry) }
    }
}
