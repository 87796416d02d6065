/// Name of the symbol returning the new-pipeline plugin record.
pub const PLUGIN_INFO_FN_NAME: &str = "__kmpass_get_plugin_info";

/// Name of the symbol registering legacy passes into a [`crate::legacy::PassRegistry`].
pub const PLUGIN_LEGACY_REGISTER_FN_NAME: &str = "__kmpass_register_legacy";

/// Name of the environment variable containing the path to the plugin manifest.
/// If not set, defaults to
///  (1) on Linux and macOS: `$XDG_CONFIG_HOME/kmpass/plugins.toml` or `$HOME/.config/kmpass/plugins.toml`
///  (2) on Windows: `%APPDATA%\kmpass\plugins.toml`
pub const ENV_PLUGIN_MANIFEST_PATH: &str = "KMPASS_CONFIG_PATH";

/// Named metadata listing NVPTX kernels and their tuning annotations.
pub const NVVM_ANNOTATIONS: &str = "nvvm.annotations";
