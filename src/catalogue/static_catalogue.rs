use super::Catalogue;
use crate::connection::MemoryDatabase;
use crate::core::{AttributeDefinition, EntityKind, Result, ViewError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSpec {
    pub name: String,

    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
}

impl BundleSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn attribute(mut self, attribute: AttributeDefinition) -> Self {
        self.attributes.push(attribute);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct KindSpec {
    #[serde(flatten)]
    kind: EntityKind,

    #[serde(default)]
    bundles: Vec<BundleSpec>,
}

/// In-memory catalogue, built in code or loaded from JSON:
///
/// ```json
/// {
///   "entity_kinds": [{
///     "name": "node",
///     "base_table": "node_field_data",
///     "id_key": "nid",
///     "bundle_entity_type": "node_type",
///     "bundles": [{
///       "name": "article",
///       "attributes": [{ "name": "tags", "label": "Tags" }]
///     }]
///   }],
///   "tables": { "node_field_data": ["nid", "langcode", "type"] }
/// }
/// ```
///
/// `tables` is optional and only used to seed a [`MemoryDatabase`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticCatalogue {
    #[serde(default)]
    entity_kinds: Vec<KindSpec>,

    #[serde(default)]
    tables: BTreeMap<String, Vec<String>>,
}

impl StaticCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ViewError::Catalogue(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
            .map_err(|e| ViewError::Catalogue(format!("{}: {}", path.display(), e)))
    }

    /// Register an entity kind with its bundles. Re-registering a kind
    /// replaces it.
    pub fn with_kind(mut self, kind: EntityKind, bundles: Vec<BundleSpec>) -> Self {
        self.entity_kinds.retain(|k| k.kind.name != kind.name);
        self.entity_kinds.push(KindSpec { kind, bundles });
        self
    }

    /// Physical table layout used by [`StaticCatalogue::seed`]
    pub fn with_table(mut self, name: &str, columns: &[&str]) -> Self {
        self.tables
            .insert(name.to_string(), columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn tables(&self) -> &BTreeMap<String, Vec<String>> {
        &self.tables
    }

    /// Create every listed table in `db`
    pub fn seed(&self, db: &MemoryDatabase) {
        for (name, columns) in &self.tables {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            db.create_table(name, &columns);
        }
    }

    fn kind_spec(&self, entity_kind: &str) -> Option<&KindSpec> {
        self.entity_kinds.iter().find(|k| k.kind.name == entity_kind)
    }
}

impl Catalogue for StaticCatalogue {
    fn entity_kinds(&self) -> Result<Vec<EntityKind>> {
        Ok(self.entity_kinds.iter().map(|k| k.kind.clone()).collect())
    }

    fn bundles(&self, entity_kind: &str) -> Result<Vec<String>> {
        let mut bundles: Vec<String> = self
            .kind_spec(entity_kind)
            .map(|k| k.bundles.iter().map(|b| b.name.clone()).collect())
            .unwrap_or_default();
        bundles.sort();
        bundles.dedup();
        Ok(bundles)
    }

    fn attributes(&self, entity_kind: &str, bundle: &str) -> Result<Vec<AttributeDefinition>> {
        Ok(self
            .kind_spec(entity_kind)
            .and_then(|k| k.bundles.iter().find(|b| b.name == bundle))
            .map(|b| b.attributes.clone())
            .unwrap_or_default())
    }
}
