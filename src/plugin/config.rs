//! Configuration lookup for the plugin loader.

use crate::error::Result;
use crate::slot::Slot;
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::hash::BuildHasher;
use std::path::Path;
use std::str::FromStr;

/// Key/value configuration the loader reads plugin descriptors from.
pub trait ConfigSource {
    /// Value for `key`, if set.
    fn lookup(&self, key: &str) -> Option<String>;
}

impl<S: BuildHasher> ConfigSource for HashMap<String, String, S> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl ConfigSource for BTreeMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl<T: ConfigSource + ?Sized> ConfigSource for &T {
    fn lookup(&self, key: &str) -> Option<String> {
        (**self).lookup(key)
    }
}

/// Settings for the plugin loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Prefix of every configuration key the loader reads.
    pub namespace: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            namespace: "NETCDF".to_string(),
        }
    }
}

impl LoaderConfig {
    /// Create a config with the default namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// `<NS>.UDF<i>.LIBRARY`
    pub fn library_key(&self, slot: Slot) -> String {
        self.slot_key(slot, "LIBRARY")
    }

    /// `<NS>.UDF<i>.INIT`
    pub fn init_key(&self, slot: Slot) -> String {
        self.slot_key(slot, "INIT")
    }

    /// `<NS>.UDF<i>.MAGIC`
    pub fn magic_key(&self, slot: Slot) -> String {
        self.slot_key(slot, "MAGIC")
    }

    /// `<NS>.DISPATCH.PATH`
    pub fn search_path_key(&self) -> String {
        format!("{}.DISPATCH.PATH", self.namespace)
    }

    fn slot_key(&self, slot: Slot, field: &str) -> String {
        format!("{}.UDF{}.{}", self.namespace, slot.index(), field)
    }
}

/// Configuration parsed from rc-file text.
///
/// One `KEY=VALUE` per line. Blank lines and lines starting with `#` are
/// ignored, whitespace around keys and values is trimmed, and a later
/// duplicate replaces an earlier one. Host-scoped entries (`[url]KEY=VALUE`)
/// are skipped: plugin configuration is process-wide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RcConfig {
    entries: BTreeMap<String, String>,
}

impl RcConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse rc-file text.
    pub fn parse(text: &str) -> Self {
        let mut config = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') {
                tracing::debug!(line = lineno + 1, "skipping host-scoped rc entry");
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    config.set(key.trim(), value.trim());
                }
                _ => tracing::debug!(line = lineno + 1, "skipping malformed rc line"),
            }
        }
        config
    }

    /// Read and parse an rc file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Set a value, replacing any previous one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ConfigSource for RcConfig {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_owned)
    }
}

impl FromStr for RcConfig {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}
