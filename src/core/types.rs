use serde::{Deserialize, Serialize};

fn default_bundle_key() -> String {
    "type".to_string()
}

/// A catalogued record type: one base table, one id column, optionally
/// subdivided into bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityKind {
    pub name: String,

    /// Base storage table (e.g. `node_field_data`)
    #[serde(default)]
    pub base_table: Option<String>,

    /// Primary key column of the base table
    #[serde(default)]
    pub id_key: Option<String>,

    /// Entity kind whose instances are this kind's bundles (e.g. `node_type`)
    #[serde(default)]
    pub bundle_entity_type: Option<String>,

    /// Bundle discriminator column of the base table
    #[serde(default = "default_bundle_key")]
    pub bundle_key: String,
}

impl EntityKind {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            base_table: None,
            id_key: None,
            bundle_entity_type: None,
            bundle_key: default_bundle_key(),
        }
    }

    pub fn base_table(mut self, table: &str) -> Self {
        self.base_table = Some(table.to_string());
        self
    }

    pub fn id_key(mut self, key: &str) -> Self {
        self.id_key = Some(key.to_string());
        self
    }

    pub fn bundle_entity_type(mut self, bundle_type: &str) -> Self {
        self.bundle_entity_type = Some(bundle_type.to_string());
        self
    }

    pub fn bundle_key(mut self, key: &str) -> Self {
        self.bundle_key = key.to_string();
        self
    }

    /// Base table and id column, if both are known and non-empty.
    pub fn storage(&self) -> Option<BaseStorage<'_>> {
        let table = self.base_table.as_deref().filter(|t| !t.is_empty())?;
        let id_key = self.id_key.as_deref().filter(|k| !k.is_empty())?;
        Some(BaseStorage {
            table,
            id_key,
            bundle_key: &self.bundle_key,
        })
    }

    /// Eligible for a single-bundle view.
    pub fn is_eligible(&self) -> bool {
        self.storage().is_some()
    }

    /// Eligible for batch flattening: storage plus a bundle concept.
    pub fn is_flattenable(&self) -> bool {
        self.is_eligible()
            && self
                .bundle_entity_type
                .as_deref()
                .is_some_and(|b| !b.is_empty())
    }
}

/// Resolved physical storage of an eligible [`EntityKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseStorage<'a> {
    pub table: &'a str,
    pub id_key: &'a str,
    pub bundle_key: &'a str,
}

/// A field attached to one (entity kind, bundle) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Machine name, unique per bundle
    pub name: String,

    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub description: Option<String>,
}

impl AttributeDefinition {
    pub fn new(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            description: None,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Satellite table holding this attribute's rows: `<entity kind>__<name>`.
    pub fn satellite_table(&self, entity_kind: &str) -> String {
        format!("{}__{}", entity_kind, self.name)
    }

    /// Human description for the meta view: `label: description`, or the
    /// label alone. A blank label falls back to the machine name.
    pub fn comment(&self) -> String {
        let label = self.label.trim();
        let description = self.description.as_deref().map(str::trim).unwrap_or("");

        match (label.is_empty(), description.is_empty()) {
            (false, false) => format!("{}: {}", label, description),
            (false, true) => label.to_string(),
            (true, false) => format!("{}: {}", self.name, description),
            (true, true) => self.name.clone(),
        }
    }
}

/// One (entity kind, bundle) pair a view is generated for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ViewTarget {
    pub entity_kind: String,
    pub bundle: String,
}

impl ViewTarget {
    pub fn new(entity_kind: &str, bundle: &str) -> Self {
        Self {
            entity_kind: entity_kind.to_string(),
            bundle: bundle.to_string(),
        }
    }

    pub fn view_name(&self) -> String {
        crate::generator::view_name(&self.entity_kind, &self.bundle)
    }

    pub fn meta_view_name(&self) -> String {
        crate::generator::meta_view_name(&self.entity_kind, &self.bundle)
    }
}
