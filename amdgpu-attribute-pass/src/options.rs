//! Tuning options for the kernel entry functions.
use std::collections::BTreeMap;

use kmpass::utils::error::{KmError, KmResult};
use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::PIPELINE_NAME;

/// Environment variable restricting annotation to a single kernel entry.
pub const ENV_KERNEL_ENTRY_FUNCTION_NAME: &str = "AMDGPU_KERNEL_ENTRY_FUNCTION_NAME";

/// Pipeline parameter restricting annotation to a single kernel entry.
pub const PARAM_KERNEL: &str = "kernel";

/// Pipeline parameter pulling the environment variables in.
pub const PARAM_FROM_ENV: &str = "from-env";

/// AMDGPU function attributes the pass can set on kernel entries. The display
/// form is the attribute key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, IntoStaticStr, EnumIter,
)]
pub enum TuningAttribute {
    #[strum(serialize = "amdgpu-flat-work-group-size")]
    FlatWorkGroupSize,
    #[strum(serialize = "amdgpu-num-sgpr")]
    NumSgpr,
    #[strum(serialize = "amdgpu-num-vgpr")]
    NumVgpr,
    #[strum(serialize = "amdgpu-waves-per-eu")]
    WavesPerEu,
}

impl TuningAttribute {
    pub fn key(self) -> &'static str {
        self.into()
    }

    pub fn env_var(self) -> &'static str {
        match self {
            TuningAttribute::FlatWorkGroupSize => "AMDGPU_FLAT_WORK_GROUP_SIZE",
            TuningAttribute::NumSgpr => "AMDGPU_NUM_SGPR",
            TuningAttribute::NumVgpr => "AMDGPU_NUM_VGPR",
            TuningAttribute::WavesPerEu => "AMDGPU_WAVES_PER_EU",
        }
    }

    /// Key accepted in `amdgpu-attribute<...>`.
    pub fn param_key(self) -> &'static str {
        match self {
            TuningAttribute::FlatWorkGroupSize => "flat-work-group-size",
            TuningAttribute::NumSgpr => "num-sgpr",
            TuningAttribute::NumVgpr => "num-vgpr",
            TuningAttribute::WavesPerEu => "waves-per-eu",
        }
    }
}

/// Options of one pass instance. The default leaves every option unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmdgpuAttributeOptions {
    /// Only the kernel entry with this name is annotated.
    pub kernel_name: Option<String>,
    tuning: BTreeMap<TuningAttribute, String>,
}

fn non_empty(value: impl Into<String>) -> Option<String> {
    Some(value.into()).filter(|value| !value.is_empty())
}

impl AmdgpuAttributeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options read from the `AMDGPU_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Options read through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::new();
        options.kernel_name = lookup(ENV_KERNEL_ENTRY_FUNCTION_NAME).and_then(non_empty);
        for attr in TuningAttribute::iter() {
            if let Some(value) = lookup(attr.env_var()) {
                options.set_tuning(attr, value);
            }
        }
        options
    }

    /// Set (or, with an empty value, clear) a tuning attribute.
    pub fn set_tuning(&mut self, attr: TuningAttribute, value: impl Into<String>) {
        match non_empty(value) {
            Some(value) => {
                self.tuning.insert(attr, value);
            }
            None => {
                self.tuning.remove(&attr);
            }
        }
    }

    pub fn tuning(&self, attr: TuningAttribute) -> Option<&str> {
        self.tuning.get(&attr).map(String::as_str)
    }

    /// Set tuning attributes in declaration order.
    pub fn tuning_attributes(&self) -> impl Iterator<Item = (TuningAttribute, &str)> {
        self.tuning.iter().map(|(attr, value)| (*attr, value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.kernel_name.is_none() && self.tuning.is_empty()
    }

    /// Options described by the parameter text of `amdgpu-attribute<...>`:
    /// `;` separated `key=value` entries, plus the bare `from-env` flag that
    /// layers the environment under the explicit entries.
    pub fn from_params(params: &str) -> KmResult<Self> {
        Self::from_params_with_lookup(params, |name| std::env::var(name).ok())
    }

    pub fn from_params_with_lookup(
        params: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> KmResult<Self> {
        let entries: Vec<&str> = params
            .split(';')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .collect();

        let mut options = if entries.contains(&PARAM_FROM_ENV) {
            Self::from_lookup(lookup)
        } else {
            Self::new()
        };

        for entry in entries.into_iter().filter(|entry| *entry != PARAM_FROM_ENV) {
            let invalid = || KmError::InvalidPassParameter {
                pass: PIPELINE_NAME.to_string(),
                param: entry.to_string(),
            };

            let (key, value) = entry.split_once('=').ok_or_else(invalid)?;
            let (key, value) = (key.trim(), value.trim());

            if key == PARAM_KERNEL {
                options.kernel_name = non_empty(value);
                continue;
            }

            let attr = TuningAttribute::iter()
                .find(|attr| attr.param_key() == key)
                .ok_or_else(invalid)?;
            options.set_tuning(attr, value);
        }

        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn environment_variables_map_to_attributes() {
        let options = AmdgpuAttributeOptions::from_lookup(env(&[
            ("AMDGPU_KERNEL_ENTRY_FUNCTION_NAME", "foo"),
            ("AMDGPU_NUM_SGPR", "32"),
            ("AMDGPU_WAVES_PER_EU", ""),
        ]));

        assert_eq!(options.kernel_name.as_deref(), Some("foo"));
        assert_eq!(options.tuning(TuningAttribute::NumSgpr), Some("32"));
        assert_eq!(options.tuning(TuningAttribute::WavesPerEu), None);
        assert_eq!(
            options.tuning_attributes().collect::<Vec<_>>(),
            vec![(TuningAttribute::NumSgpr, "32")]
        );
    }

    #[test]
    fn empty_environment_leaves_options_unset() {
        assert!(AmdgpuAttributeOptions::from_lookup(env(&[])).is_empty());
    }

    #[test]
    fn parameters_override_the_environment() {
        let options = AmdgpuAttributeOptions::from_params_with_lookup(
            "num-vgpr=64; from-env; num-sgpr=16;kernel=bar",
            env(&[
                ("AMDGPU_KERNEL_ENTRY_FUNCTION_NAME", "foo"),
                ("AMDGPU_NUM_SGPR", "32"),
                ("AMDGPU_FLAT_WORK_GROUP_SIZE", "1,256"),
            ]),
        )
        .unwrap();

        assert_eq!(options.kernel_name.as_deref(), Some("bar"));
        assert_eq!(
            options.tuning_attributes().collect::<Vec<_>>(),
            vec![
                (TuningAttribute::FlatWorkGroupSize, "1,256"),
                (TuningAttribute::NumSgpr, "16"),
                (TuningAttribute::NumVgpr, "64"),
            ]
        );
    }

    #[test]
    fn environment_is_ignored_without_the_flag() {
        let options = AmdgpuAttributeOptions::from_params_with_lookup(
            "",
            env(&[("AMDGPU_NUM_SGPR", "32")]),
        )
        .unwrap();
        assert!(options.is_empty());
    }

    #[test]
    fn unknown_parameters_are_rejected() {
        for params in ["num-agpr=3", "kernel"] {
            let err = AmdgpuAttributeOptions::from_params_with_lookup(params, env(&[])).unwrap_err();
            assert!(matches!(
                err,
                KmError::InvalidPassParameter { pass, param } if pass == "amdgpu-attribute" && param == params
            ));
        }
    }

    #[test]
    fn attribute_keys_follow_the_backend_names() {
        let keys: Vec<_> = TuningAttribute::iter().map(TuningAttribute::key).collect();
        assert_eq!(
            keys,
            vec![
                "amdgpu-flat-work-group-size",
                "amdgpu-num-sgpr",
                "amdgpu-num-vgpr",
                "amdgpu-waves-per-eu"
            ]
        );
    }
}
