// ============================================================================
// Entity Views Library
// ============================================================================

pub mod catalogue;
pub mod config;
pub mod connection;
pub mod core;
pub mod generator;
pub mod schema;
pub mod sql;
mod expression;

// Re-export main types for convenience
pub use crate::core::{AttributeDefinition, EntityKind, Result, ViewError, ViewTarget};
pub use generator::{BundleFailure, RebuildReport, ViewGenerator, ViewPlan, meta_view_name, view_name};

// Re-export collaborator API
pub use catalogue::{BundleSpec, Catalogue, StaticCatalogue};
pub use config::{ConfigStore, GeneratorSettings, JsonFileConfig, OrderMode, SharedConfig, StaticConfig};
pub use connection::{Connection, ConnectionConfig, Driver, MemoryConnection, MemoryDatabase};

#[cfg(feature = "mysql")]
pub use connection::MySqlConnection;

// ============================================================================
// Quick start
// ============================================================================

/// Build a generator over an in-process database.
///
/// # Examples
///
/// ```
/// use entity_views::{
///     AttributeDefinition, BundleSpec, EntityKind, GeneratorSettings, MemoryDatabase,
///     StaticCatalogue,
/// };
///
/// # tokio_test::block_on(async {
/// let db = MemoryDatabase::new("cms")
///     .with_table("article", &["id", "langcode", "type", "uid", "status", "created", "changed"])
///     .with_table("article__tags", &["entity_id", "langcode", "delta", "deleted", "target_id"]);
///
/// let catalogue = StaticCatalogue::new().with_kind(
///     EntityKind::new("article")
///         .base_table("article")
///         .id_key("id")
///         .bundle_entity_type("article_type"),
///     vec![BundleSpec::new("blog").attribute(AttributeDefinition::new("tags", "Tags"))],
/// );
///
/// let generator = entity_views::in_memory(&db, catalogue, GeneratorSettings::default());
/// assert_eq!(generator.rebuild_all().await, vec!["view_article__blog"]);
/// assert_eq!(
///     generator.list_managed_views().await.unwrap(),
///     vec!["view_article__blog", "view_article__blog__meta"]
/// );
/// # });
/// ```
pub fn in_memory(
    db: &MemoryDatabase,
    catalogue: StaticCatalogue,
    settings: GeneratorSettings,
) -> ViewGenerator {
    ViewGenerator::new(
        std::sync::Arc::new(db.connect()),
        std::sync::Arc::new(catalogue),
        std::sync::Arc::new(StaticConfig::new(settings)),
    )
}
