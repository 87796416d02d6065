//! Function attributes.
//!
//! Attributes come in two flavours: well-known flags ([`AttrKind`]) and
//! free-form `"key"="value"` string attributes used to pass target-specific
//! hints to later compilation stages. Adding an attribute whose key is already
//! present replaces its value, so attaching the same attribute twice never
//! produces duplicates.
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Well-known function attribute flags.
#[derive(
    Debug,
    Clone,
    Copy,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    IntoStaticStr,
    EnumIter,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AttrKind {
    /// The function is not to be optimized; optional passes skip it.
    #[strum(serialize = "optnone")]
    OptNone,
    #[strum(serialize = "noinline")]
    NoInline,
    #[strum(serialize = "alwaysinline")]
    AlwaysInline,
    #[strum(serialize = "convergent")]
    Convergent,
    #[strum(serialize = "nounwind")]
    NoUnwind,
    #[strum(serialize = "norecurse")]
    NoRecurse,
}

/// A single attribute, as yielded by [`AttributeSet::iter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute<'a> {
    Kind(AttrKind),
    String { key: &'a str, value: &'a str },
}

/// Set of attributes attached to a function.
#[derive(Debug, Default, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttributeSet {
    kinds: BTreeSet<AttrKind>,
    strings: BTreeMap<String, String>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty() && self.strings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.kinds.len() + self.strings.len()
    }

    /// Add a flag attribute. Returns `false` if it was already present.
    pub fn add_kind(&mut self, kind: AttrKind) -> bool {
        self.kinds.insert(kind)
    }

    /// Add (or replace) a string attribute. Returns the previous value, if any.
    pub fn add_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.strings.insert(key.into(), value.into())
    }

    pub fn has_kind(&self, kind: AttrKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn has_string(&self, key: &str) -> bool {
        self.strings.contains_key(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.strings.get(key).map(String::as_str)
    }

    pub fn remove_kind(&mut self, kind: AttrKind) -> bool {
        self.kinds.remove(&kind)
    }

    pub fn remove_string(&mut self, key: &str) -> Option<String> {
        self.strings.remove(key)
    }

    /// Iterate over flags first, then string attributes ordered by key.
    pub fn iter(&self) -> impl Iterator<Item = Attribute<'_>> {
        self.kinds.iter().map(|kind| Attribute::Kind(*kind)).chain(
            self.strings
                .iter()
                .map(|(key, value)| Attribute::String { key, value }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_attribute_is_replaced_not_duplicated() {
        let mut attrs = AttributeSet::new();
        assert_eq!(attrs.add_string("amdgpu-num-sgpr", "32"), None);
        assert_eq!(
            attrs.add_string("amdgpu-num-sgpr", "48"),
            Some("32".to_string())
        );

        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get_string("amdgpu-num-sgpr"), Some("48"));
    }

    #[test]
    fn kinds_are_listed_before_strings() {
        let mut attrs = AttributeSet::new();
        attrs.add_string("b", "");
        attrs.add_kind(AttrKind::NoInline);
        assert!(!attrs.add_kind(AttrKind::NoInline));

        let listed: Vec<_> = attrs.iter().collect();
        assert_eq!(
            listed,
            vec![
                Attribute::Kind(AttrKind::NoInline),
                Attribute::String { key: "b", value: "" },
            ]
        );
    }
}
