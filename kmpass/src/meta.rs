use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    magic::ENV_PLUGIN_MANIFEST_PATH,
    utils::error::{KmError, KmResult},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    pub path: String,
}

/// List of the pass plugins the host knows how to load.
///
/// ```toml
/// [[plugin]]
/// name = "AMDGPUAttributePass"
/// path = "/usr/lib/kmpass/libamdgpu_attribute_pass.so"
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    #[serde(default)]
    pub plugin: Vec<PluginEntry>,
}

impl PluginManifest {
    /// Get the default path to the plugin manifest.
    pub fn default_path() -> PathBuf {
        if let Ok(config_path) = std::env::var(ENV_PLUGIN_MANIFEST_PATH) {
            return config_path.into();
        }

        let mut path = PathBuf::new();

        #[cfg(target_os = "windows")]
        {
            if let Ok(appdata) = std::env::var("APPDATA") {
                path.push(appdata);
            }
        }
        #[cfg(not(target_os = "windows"))]
        {
            if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
                path.push(xdg_config_home);
            } else if let Ok(home) = std::env::var("HOME") {
                path.push(home);
                path.push(".config");
            }
        }

        path.push("kmpass");
        path.push("plugins.toml");
        path
    }

    pub fn find(&self, name: &str) -> Option<&PluginEntry> {
        self.plugin.iter().find(|entry| entry.name == name)
    }

    pub fn load_from_toml(path: &Path) -> KmResult<Self> {
        let toml_str = std::fs::read_to_string(path)?;

        toml::from_str(&toml_str).map_err(|e| KmError::ManifestParse {
            source: e,
            file: path.display().to_string(),
        })
    }

    pub fn save_to_toml(&self, path: &Path) -> KmResult<()> {
        let toml_str = toml::to_string(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, toml_str)?;
        Ok(())
    }
}
