//! Host catalogue: the read-only source of entity kinds, bundles and
//! attribute definitions.

pub mod static_catalogue;

pub use static_catalogue::{BundleSpec, StaticCatalogue};

use crate::core::{AttributeDefinition, EntityKind, Result};

/// Narrow view of the host platform's entity/bundle/field metadata.
pub trait Catalogue: Send + Sync {
    /// Every known entity kind, eligible or not
    fn entity_kinds(&self) -> Result<Vec<EntityKind>>;

    fn entity_kind(&self, name: &str) -> Result<Option<EntityKind>> {
        Ok(self.entity_kinds()?.into_iter().find(|k| k.name == name))
    }

    /// Bundle names of one kind, sorted
    fn bundles(&self, entity_kind: &str) -> Result<Vec<String>>;

    /// Attributes of one bundle, in catalogue order
    fn attributes(&self, entity_kind: &str, bundle: &str) -> Result<Vec<AttributeDefinition>>;
}
