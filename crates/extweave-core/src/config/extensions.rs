//! Per-extension enable/disable configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single entry of the `[extensions]` table.
///
/// An extension counts as switched on when its entry is the boolean `true`
/// or a table whose `enabled` field is `true`. Anything else is off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtensionEntry {
    /// `id = true` / `id = false`.
    Toggle(bool),
    /// `id = { enabled = true, config = { ... } }`.
    Detailed(ExtensionSettings),
    /// Any other value; never enables the extension.
    Other(serde_json::Value),
}

/// Table form of an extension entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionSettings {
    /// Whether the extension is switched on.
    #[serde(default)]
    pub enabled: bool,
    /// Extension-specific settings, opaque to the loader.
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

impl ExtensionEntry {
    /// Returns whether this entry switches the extension on.
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Toggle(on) => *on,
            Self::Detailed(settings) => settings.enabled,
            Self::Other(_) => false,
        }
    }
}

/// The `[extensions]` table: extension id → entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionsConfig {
    entries: HashMap<String, ExtensionEntry>,
}

impl ExtensionsConfig {
    /// Creates an empty extension table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the extension is explicitly switched on.
    pub fn is_enabled(&self, id: &str) -> bool {
        self.entries
            .get(id)
            .map(ExtensionEntry::is_enabled)
            .unwrap_or(false)
    }

    /// Returns the raw entry for an extension.
    pub fn get(&self, id: &str) -> Option<&ExtensionEntry> {
        self.entries.get(id)
    }

    /// Sets the entry for an extension.
    pub fn set(&mut self, id: impl Into<String>, entry: ExtensionEntry) {
        self.entries.insert(id.into(), entry);
    }

    /// Builder-style toggle, mostly useful in tests and tooling.
    pub fn with(mut self, id: impl Into<String>, enabled: bool) -> Self {
        self.set(id, ExtensionEntry::Toggle(enabled));
        self
    }

    /// Returns whether no extension is configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, ExtensionEntry)> for ExtensionsConfig {
    fn from_iter<I: IntoIterator<Item = (String, ExtensionEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
