//! Extension manifests and descriptors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use extweave_core::ExtensionId;

use crate::procedure::{LoadProcedure, NoopProcedure};

/// Human-facing metadata about an extension. Not used for planning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionMeta {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Version string.
    #[serde(default)]
    pub version: Option<String>,
    /// Short description.
    #[serde(default)]
    pub description: Option<String>,
    /// Authors or maintainers.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Declared identity and relationships of a discovered extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionManifest {
    /// Unique identifier.
    pub id: ExtensionId,
    /// Optional metadata.
    #[serde(default)]
    pub meta: ExtensionMeta,
    /// Extensions that must load before this one.
    #[serde(default)]
    pub dependencies: Vec<ExtensionId>,
    /// Extensions that should load before this one if they are active.
    #[serde(default)]
    pub suggested: Vec<ExtensionId>,
    /// Extensions that cannot be active together with this one.
    #[serde(default)]
    pub incompatible: Vec<ExtensionId>,
}

impl ExtensionManifest {
    /// Creates a manifest with no relationships.
    pub fn new(id: impl Into<ExtensionId>) -> Self {
        Self {
            id: id.into(),
            meta: ExtensionMeta::default(),
            dependencies: Vec::new(),
            suggested: Vec::new(),
            incompatible: Vec::new(),
        }
    }

    /// Adds required dependencies.
    pub fn requires<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ExtensionId>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Adds suggested (optional) dependencies.
    pub fn suggests<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ExtensionId>,
    {
        self.suggested.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Adds incompatible extensions.
    pub fn incompatible_with<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ExtensionId>,
    {
        self.incompatible.extend(ids.into_iter().map(Into::into));
        self
    }
}

impl AsRef<ExtensionManifest> for ExtensionManifest {
    fn as_ref(&self) -> &ExtensionManifest {
        self
    }
}

/// A discovered extension: its manifest plus the procedure that loads it.
#[derive(Debug, Clone)]
pub struct ExtensionDescriptor {
    manifest: ExtensionManifest,
    procedure: Arc<dyn LoadProcedure>,
}

impl ExtensionDescriptor {
    /// Creates a descriptor.
    pub fn new(manifest: ExtensionManifest, procedure: Arc<dyn LoadProcedure>) -> Self {
        Self {
            manifest,
            procedure,
        }
    }

    /// Creates a descriptor whose load procedure does nothing.
    pub fn without_procedure(manifest: ExtensionManifest) -> Self {
        Self::new(manifest, Arc::new(NoopProcedure))
    }

    /// Returns the extension id.
    pub fn id(&self) -> &ExtensionId {
        &self.manifest.id
    }

    /// Returns the manifest.
    pub fn manifest(&self) -> &ExtensionManifest {
        &self.manifest
    }

    /// Returns the load procedure.
    pub fn procedure(&self) -> &Arc<dyn LoadProcedure> {
        &self.procedure
    }
}

impl AsRef<ExtensionManifest> for ExtensionDescriptor {
    fn as_ref(&self) -> &ExtensionManifest {
        &self.manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_defaults_from_json() {
        let manifest: ExtensionManifest = serde_json::from_value(serde_json::json!({
            "id": "moonbase",
            "meta": { "name": "Moonbase", "authors": ["Cynosphere"] },
            "dependencies": ["spacepack", "settings"],
        }))
        .expect("deserialize");

        assert_eq!(manifest.id.as_str(), "moonbase");
        assert_eq!(manifest.meta.name.as_deref(), Some("Moonbase"));
        assert_eq!(manifest.dependencies.len(), 2);
        assert!(manifest.suggested.is_empty());
        assert!(manifest.incompatible.is_empty());
    }

    #[test]
    fn test_manifest_with_blank_id_is_rejected() {
        let blank = serde_json::from_value::<ExtensionManifest>(serde_json::json!({ "id": "  " }));
        assert!(blank.is_err());

        let blank_dependency = serde_json::from_value::<ExtensionManifest>(serde_json::json!({
            "id": "moonbase",
            "dependencies": [""],
        }));
        assert!(blank_dependency.is_err());
    }

    #[test]
    fn test_builder_keeps_declaration_order() {
        let manifest = ExtensionManifest::new("a")
            .requires(["c", "b"])
            .suggests(["d"])
            .incompatible_with(["e"]);
        let deps: Vec<&str> = manifest.dependencies.iter().map(ExtensionId::as_str).collect();
        assert_eq!(deps, vec!["c", "b"]);
        assert_eq!(manifest.suggested, vec![ExtensionId::from("d")]);
        assert_eq!(manifest.incompatible, vec![ExtensionId::from("e")]);
    }
}
