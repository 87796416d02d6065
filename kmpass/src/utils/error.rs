use semver::{Version, VersionReq};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse manifest file '{file}': {source}")]
    ManifestParse {
        source: toml::de::Error,
        file: String,
    },

    #[error("Failed to serialize manifest: {0}")]
    ManifestSerialize(#[from] toml::ser::Error),

    #[error("Plugin with name '{0}' not found")]
    PluginNotFound(String),

    #[error("Failed to load plugin from file '{file}': {source}")]
    PluginLoad {
        source: libloading::Error,
        file: String,
    },

    #[error(
        "Plugin '{name}' was built against plugin API version {found}, the host expects {expected}"
    )]
    PluginApiMismatch {
        name: String,
        expected: u32,
        found: u32,
    },

    #[error(
        "Compability check failed for plugin '{name}'. Required: {req}, found: {version}"
    )]
    CompatibilityCheckFailed {
        name: String,
        version: Version,
        req: VersionReq,
    },

    #[error("Invalid version string '{version}': {source}")]
    InvalidVersion {
        source: semver::Error,
        version: String,
    },

    #[error("Unknown pass '{0}' in pipeline")]
    UnknownPass(String),

    #[error("A pass named '{0}' is already registered")]
    DuplicatePass(String),

    #[error("Invalid pipeline '{pipeline}': {reason}")]
    InvalidPipeline { pipeline: String, reason: String },

    #[error("Invalid parameter '{param}' for pass '{pass}'")]
    InvalidPassParameter { pass: String, param: String },

    #[error(
        "Symbol `@{name}` exists in the module but does not match the runtime function signature"
    )]
    RuntimeFunctionMismatch { name: String },

    #[error("Module verification failed: {0}")]
    Verification(#[from] kmir::utils::Error),
}

pub type KmResult<T> = Result<T, KmError>;
