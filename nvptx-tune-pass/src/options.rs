use std::collections::BTreeMap;

use kmpass::utils::error::{KmError, KmResult};
use log::warn;
use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::TUNE_PIPELINE_NAME;

/// Environment variable naming the kernel to tune.
pub const ENV_FUNCTION_NAME: &str = "NVPTX_FUNCTION_NAME";

/// Value meaning "leave the directive unset".
pub const UNSET: i64 = -1;

/// NVPTX tuning directives, written as `nvvm.annotations` entries. The
/// display form is the annotation key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, IntoStaticStr, EnumIter,
)]
pub enum TuneDirective {
    #[strum(serialize = "maxnreg")]
    MaxRegisters,
    #[strum(serialize = "maxntid")]
    MaxThreads,
    #[strum(serialize = "reqntid")]
    RequestThreads,
    #[strum(serialize = "minnctapersm")]
    MinBlocks,
}

impl TuneDirective {
    pub fn env_var(self) -> &'static str {
        match self {
            TuneDirective::MaxRegisters => "MAX_REGISTERS",
            TuneDirective::MaxThreads => "MAX_THREADS",
            TuneDirective::RequestThreads => "REQUEST_THREADS",
            TuneDirective::MinBlocks => "MIN_BLOCKS",
        }
    }

    pub fn param_key(self) -> &'static str {
        match self {
            TuneDirective::MaxRegisters => "max-registers",
            TuneDirective::MaxThreads => "max-threads",
            TuneDirective::RequestThreads => "req-threads",
            TuneDirective::MinBlocks => "min-blocks",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NvptxTuneOptions {
    /// Kernel to tune. Every other kernel, and every kernel when empty, is
    /// skipped.
    pub function_name: String,
    values: BTreeMap<TuneDirective, i64>,
}

impl NvptxTuneOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::new();
        options.function_name = lookup(ENV_FUNCTION_NAME).unwrap_or_default();

        for directive in TuneDirective::iter() {
            let Some(raw) = lookup(directive.env_var()) else {
                continue;
            };
            match raw.trim().parse::<i64>() {
                Ok(value) => options.set(directive, value),
                Err(e) => warn!(
                    "Ignoring {}={:?}: {}",
                    directive.env_var(),
                    raw,
                    e
                ),
            }
        }
        options
    }

    /// Set a directive; [`UNSET`] clears it.
    pub fn set(&mut self, directive: TuneDirective, value: i64) {
        if value == UNSET {
            self.values.remove(&directive);
        } else {
            self.values.insert(directive, value);
        }
    }

    pub fn get(&self, directive: TuneDirective) -> Option<i64> {
        self.values.get(&directive).copied()
    }

    /// Directives that are set, in declaration order.
    pub fn directives(&self) -> impl Iterator<Item = (TuneDirective, i64)> + '_ {
        self.values.iter().map(|(directive, value)| (*directive, *value))
    }

    /// Environment options overridden by the parameter text of
    /// `nvptx-tune<...>` (`;` separated `key=value` entries).
    pub fn from_params(params: &str) -> KmResult<Self> {
        Self::from_params_with_lookup(params, |name| std::env::var(name).ok())
    }

    pub fn from_params_with_lookup(
        params: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> KmResult<Self> {
        let mut options = Self::from_lookup(lookup);

        for entry in params.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let invalid = || KmError::InvalidPassParameter {
                pass: TUNE_PIPELINE_NAME.to_string(),
                param: entry.to_string(),
            };

            let (key, value) = entry.split_once('=').ok_or_else(invalid)?;
            let (key, value) = (key.trim(), value.trim());

            if key == "function" {
                options.function_name = value.to_string();
                continue;
            }

            let directive = TuneDirective::iter()
                .find(|d| d.param_key() == key)
                .ok_or_else(invalid)?;
            let value = value.parse::<i64>().map_err(|_| invalid())?;
            options.set(directive, value);
        }

        Ok(options)
    }
}
