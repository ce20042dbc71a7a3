//! View lifecycle: plan, create, drop and discover flattened views.
//!
//! Every public operation takes one settings snapshot and runs each bundle
//! as its own unit of work:
//!
//! 1. introspect the base and satellite tables and build the statements
//! 2. `SET SESSION group_concat_max_len`
//! 3. take the bundle's advisory lock (when configured)
//! 4. `START TRANSACTION`, drop/create view and meta view, `COMMIT`
//!
//! A failing statement rolls the unit back. When the connection cannot
//! roll back DDL (MySQL), the separate drop is left out and the view is
//! swapped by the single `CREATE OR REPLACE`, so a failed create still leaves
//! the previous view in place.

pub mod naming;
pub mod report;

pub use naming::{lock_name, managed_view_pattern, meta_view_name, view_name};
pub use report::{BundleFailure, RebuildReport, ViewPlan};

use crate::catalogue::Catalogue;
use crate::config::{ConfigStore, GeneratorSettings};
use crate::connection::Connection;
use crate::core::{EntityKind, Result, ViewError, ViewTarget};
use crate::schema::{SchemaIntrospector, select_value_columns};
use crate::sql::{AggregateQuery, MetaViewDefinition, ViewDefinition, drop_view_sql, validate_identifier};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

const GROUP_CONCAT_MAX_LEN: &str = "group_concat_max_len";

/// Generates and manages the flattened views of one database session.
///
/// Transactions are per session, so concurrent callers should each hold a
/// generator over their own connection.
pub struct ViewGenerator {
    connection: Arc<dyn Connection>,
    catalogue: Arc<dyn Catalogue>,
    config: Arc<dyn ConfigStore>,
}

impl ViewGenerator {
    pub fn new(
        connection: Arc<dyn Connection>,
        catalogue: Arc<dyn Catalogue>,
        config: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            connection,
            catalogue,
            config,
        }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn catalogue(&self) -> &Arc<dyn Catalogue> {
        &self.catalogue
    }

    /// Anything but MySQL makes every operation a no-op
    fn is_supported(&self) -> bool {
        let driver = self.connection.driver();
        if !driver.is_supported() {
            debug!(%driver, "unsupported driver, nothing to do");
            return false;
        }
        true
    }

    /// Rebuild every bundle of every flattenable entity kind. Returns the
    /// names of the views created or updated; failures are logged and left
    /// out.
    pub async fn rebuild_all(&self) -> Vec<String> {
        match self.rebuild_all_report().await {
            Ok(report) => report.created,
            Err(e) => {
                warn!(error = %e, "rebuild aborted");
                Vec::new()
            }
        }
    }

    /// Like [`ViewGenerator::rebuild_all`], keeping the failure reasons.
    /// Errors only when settings or the entity kind list cannot be read.
    pub async fn rebuild_all_report(&self) -> Result<RebuildReport> {
        let mut report = RebuildReport::default();
        if !self.is_supported() {
            return Ok(report);
        }
        let settings = self.config.snapshot()?;

        for kind in self.supported_entity_kinds()? {
            let bundles = match self.catalogue.bundles(&kind.name) {
                Ok(bundles) => bundles,
                Err(e) => {
                    warn!(entity_kind = %kind.name, error = %e, "cannot list bundles");
                    continue;
                }
            };

            for bundle in bundles {
                match self.build_bundle(&settings, &kind, &bundle).await {
                    Ok(Some(name)) => report.created.push(name),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(entity_kind = %kind.name, %bundle, error = %e, "view not created");
                        report.failed.push(BundleFailure {
                            entity_kind: kind.name.clone(),
                            bundle,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            created = report.created.len(),
            failed = report.failed.len(),
            "rebuild finished"
        );
        Ok(report)
    }

    /// Create or update one bundle's view (and meta view). `None` when the
    /// kind is unknown or ineligible, or when creation failed.
    pub async fn create_view_for_bundle(&self, entity_kind: &str, bundle: &str) -> Option<String> {
        match self.try_create_view_for_bundle(entity_kind, bundle).await {
            Ok(name) => name,
            Err(e) => {
                warn!(entity_kind, bundle, error = %e, "view not created");
                None
            }
        }
    }

    /// [`ViewGenerator::create_view_for_bundle`] with the failure reason
    pub async fn try_create_view_for_bundle(
        &self,
        entity_kind: &str,
        bundle: &str,
    ) -> Result<Option<String>> {
        if !self.is_supported() {
            return Ok(None);
        }
        let settings = self.config.snapshot()?;
        match self.catalogue.entity_kind(entity_kind)? {
            Some(kind) => self.build_bundle(&settings, &kind, bundle).await,
            None => {
                debug!(entity_kind, "unknown entity kind");
                Ok(None)
            }
        }
    }

    /// The statements [`ViewGenerator::create_view_for_bundle`] would run.
    /// Reads the catalog but executes no DDL.
    pub async fn plan_view_for_bundle(
        &self,
        entity_kind: &str,
        bundle: &str,
    ) -> Result<Option<ViewPlan>> {
        if !self.is_supported() {
            return Ok(None);
        }
        let settings = self.config.snapshot()?;
        match self.catalogue.entity_kind(entity_kind)? {
            Some(kind) => self.plan(&settings, &kind, bundle).await,
            None => Ok(None),
        }
    }

    /// Drop a bundle's view and meta view. Absent views are fine.
    pub async fn drop_view_for_bundle(&self, entity_kind: &str, bundle: &str) -> Result<()> {
        if !self.is_supported() {
            return Ok(());
        }
        let target = ViewTarget::new(entity_kind, bundle);
        self.drop_views(&[target.view_name(), target.meta_view_name()])
            .await
    }

    /// Drop every managed view
    pub async fn drop_all(&self) -> Result<()> {
        let views = self.list_managed_views().await?;
        self.drop_views(&views).await?;
        info!(dropped = views.len(), "managed views dropped");
        Ok(())
    }

    /// Names of all views in the active database that follow the managed
    /// naming convention, sorted
    pub async fn list_managed_views(&self) -> Result<Vec<String>> {
        if !self.is_supported() {
            return Ok(Vec::new());
        }
        SchemaIntrospector::new(self.connection.as_ref())
            .list_views(&managed_view_pattern())
            .await
    }

    /// Flattenable entity kinds mapped to their sorted bundle names
    pub async fn bundles_by_entity_type(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let mut bundles = BTreeMap::new();
        for kind in self.supported_entity_kinds()? {
            let names = self.catalogue.bundles(&kind.name)?;
            bundles.insert(kind.name, names);
        }
        Ok(bundles)
    }

    /// Entity kinds with a base table, an id key and a bundle concept
    pub fn supported_entity_kinds(&self) -> Result<Vec<EntityKind>> {
        Ok(self
            .catalogue
            .entity_kinds()?
            .into_iter()
            .filter(EntityKind::is_flattenable)
            .collect())
    }

    /// Drop managed views whose bundle is gone from the catalogue, and meta
    /// views while meta views are disabled. Returns the dropped names.
    pub async fn prune_orphans(&self) -> Result<Vec<String>> {
        if !self.is_supported() {
            return Ok(Vec::new());
        }
        let settings = self.config.snapshot()?;

        let mut keep = HashSet::new();
        for kind in self.catalogue.entity_kinds()? {
            if !kind.is_eligible() {
                continue;
            }
            for bundle in self.catalogue.bundles(&kind.name)? {
                let target = ViewTarget::new(&kind.name, &bundle);
                keep.insert(target.view_name());
                if settings.create_meta_views {
                    keep.insert(target.meta_view_name());
                }
            }
        }

        let orphans: Vec<String> = self
            .list_managed_views()
            .await?
            .into_iter()
            .filter(|name| !keep.contains(name))
            .collect();
        self.drop_views(&orphans).await?;
        info!(dropped = orphans.len(), "orphaned views pruned");
        Ok(orphans)
    }

    async fn drop_views(&self, names: &[String]) -> Result<()> {
        for name in names {
            // Too long to ever have been created
            if validate_identifier(name).is_err() {
                continue;
            }
            self.connection.execute(&drop_view_sql(name)?).await?;
            debug!(view = %name, "view dropped");
        }
        Ok(())
    }

    async fn plan(
        &self,
        settings: &GeneratorSettings,
        kind: &EntityKind,
        bundle: &str,
    ) -> Result<Option<ViewPlan>> {
        let Some(storage) = kind.storage() else {
            debug!(entity_kind = %kind.name, "no base table or id key, skipping");
            return Ok(None);
        };

        let target = ViewTarget::new(&kind.name, bundle);
        let view_name = target.view_name();
        let introspector = SchemaIntrospector::new(self.connection.as_ref());

        let base_columns = introspector.list_columns(storage.table).await?;
        let mut view = ViewDefinition::new(&view_name, storage, bundle)
            .with_title(base_columns.iter().any(|c| c == "title"));

        let mut taken: HashSet<String> = view.base_columns().into_iter().collect();
        for attribute in self.catalogue.attributes(&kind.name, bundle)? {
            if taken.contains(&attribute.name) {
                warn!(view = %view_name, attribute = %attribute.name, "column name already in use, skipping");
                continue;
            }

            let table = attribute.satellite_table(&kind.name);
            if !introspector.table_exists(&table).await? {
                debug!(attribute = %attribute.name, %table, "no satellite table, skipping");
                continue;
            }
            let value_columns = select_value_columns(&introspector.list_columns(&table).await?);
            if value_columns.is_empty() {
                debug!(attribute = %attribute.name, %table, "no value column, skipping");
                continue;
            }

            debug!(attribute = %attribute.name, %table, ?value_columns, "aggregating");
            taken.insert(attribute.name.clone());
            view.push_attribute(AggregateQuery::new(attribute, &table, value_columns));
        }

        let transactional = self.connection.supports_transactional_ddl();
        let mut statements = Vec::new();
        if transactional {
            statements.push(view.drop_sql()?);
        }
        statements.push(view.create_sql(settings)?);

        let meta_name = target.meta_view_name();
        let meta_view_name = if settings.create_meta_views {
            let meta = MetaViewDefinition::for_view(&meta_name, &view);
            if transactional {
                statements.push(meta.drop_sql()?);
            }
            statements.push(meta.create_sql()?);
            Some(meta_name)
        } else {
            // left over from a run with meta views enabled
            if validate_identifier(&meta_name).is_ok() {
                statements.push(drop_view_sql(&meta_name)?);
            }
            None
        };

        Ok(Some(ViewPlan {
            target,
            view_name,
            meta_view_name,
            columns: view.output_columns(),
            group_concat_max_len: settings.group_concat_max_len,
            statements,
        }))
    }

    async fn build_bundle(
        &self,
        settings: &GeneratorSettings,
        kind: &EntityKind,
        bundle: &str,
    ) -> Result<Option<String>> {
        let Some(plan) = self.plan(settings, kind, bundle).await? else {
            return Ok(None);
        };

        self.connection
            .set_session_variable(GROUP_CONCAT_MAX_LEN, plan.group_concat_max_len)
            .await?;

        let lock = match settings.lock_timeout_duration() {
            Some(timeout) => {
                let name = lock_name(&plan.view_name);
                if !self.connection.try_advisory_lock(&name, timeout).await? {
                    return Err(ViewError::Lock(format!(
                        "Timed out after {:?} waiting for lock '{}'",
                        timeout, name
                    )));
                }
                Some(name)
            }
            None => None,
        };

        let outcome = self.run_unit_of_work(&plan.statements).await;

        if let Some(name) = lock {
            if let Err(e) = self.connection.release_advisory_lock(&name).await {
                warn!(lock = %name, error = %e, "cannot release lock");
            }
        }
        outcome?;

        info!(
            view = %plan.view_name,
            meta = plan.meta_view_name.is_some(),
            columns = plan.columns.len(),
            "view created"
        );
        Ok(Some(plan.view_name))
    }

    async fn run_unit_of_work(&self, statements: &[String]) -> Result<()> {
        self.connection.begin().await?;

        for sql in statements {
            debug!(%sql, "executing");
            if let Err(e) = self.connection.execute(sql).await {
                self.rollback().await;
                return Err(e);
            }
        }

        if let Err(e) = self.connection.commit().await {
            self.rollback().await;
            return Err(e);
        }
        Ok(())
    }

    async fn rollback(&self) {
        if let Err(e) = self.connection.rollback().await {
            warn!(error = %e, "rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{BundleSpec, StaticCatalogue};
    use crate::config::StaticConfig;
    use crate::connection::{Driver, MemoryConnection, MemoryDatabase};
    use crate::core::AttributeDefinition;
    use async_trait::async_trait;
    use std::time::Duration;

    /// MemoryConnection reporting MySQL's non-transactional DDL
    struct AutocommitDdl(MemoryConnection);

    #[async_trait]
    impl Connection for AutocommitDdl {
        fn driver(&self) -> Driver {
            self.0.driver()
        }

        fn database_name(&self) -> &str {
            self.0.database_name()
        }

        async fn execute(&self, sql: &str) -> Result<()> {
            self.0.execute(sql).await
        }

        async fn fetch_strings(&self, sql: &str, params: &[&str]) -> Result<Vec<String>> {
            self.0.fetch_strings(sql, params).await
        }

        async fn begin(&self) -> Result<()> {
            self.0.begin().await
        }

        async fn commit(&self) -> Result<()> {
            self.0.commit().await
        }

        async fn rollback(&self) -> Result<()> {
            self.0.rollback().await
        }

        async fn try_advisory_lock(&self, name: &str, timeout: Duration) -> Result<bool> {
            self.0.try_advisory_lock(name, timeout).await
        }

        async fn release_advisory_lock(&self, name: &str) -> Result<()> {
            self.0.release_advisory_lock(name).await
        }
    }

    fn database() -> MemoryDatabase {
        MemoryDatabase::new("drupal")
            .with_table(
                "article",
                &["id", "langcode", "type", "title", "uid", "status", "created", "changed"],
            )
            .with_table(
                "article__tags",
                &["bundle", "deleted", "entity_id", "revision_id", "langcode", "delta", "target_id"],
            )
    }

    fn catalogue() -> StaticCatalogue {
        StaticCatalogue::new().with_kind(
            EntityKind::new("article")
                .base_table("article")
                .id_key("id")
                .bundle_entity_type("article_type"),
            vec![
                BundleSpec::new("blog")
                    .attribute(AttributeDefinition::new("tags", "Tags"))
                    .attribute(AttributeDefinition::new("missing", "Missing"))
                    .attribute(AttributeDefinition::new("status", "Clash")),
            ],
        )
    }

    fn generator(connection: Arc<dyn Connection>, settings: GeneratorSettings) -> ViewGenerator {
        ViewGenerator::new(
            connection,
            Arc::new(catalogue()),
            Arc::new(StaticConfig::new(settings)),
        )
    }

    #[tokio::test]
    async fn test_plan_transactional() {
        let db = database();
        let generator = generator(Arc::new(db.connect()), GeneratorSettings::default());

        let plan = generator
            .plan_view_for_bundle("article", "blog")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(plan.view_name, "view_article__blog");
        assert_eq!(plan.meta_view_name.as_deref(), Some("view_article__blog__meta"));
        assert_eq!(
            plan.columns,
            vec!["id", "langcode", "type", "title", "uid", "status", "created", "changed", "tags"]
        );
        assert_eq!(plan.statements.len(), 4);
        assert_eq!(plan.statements[0], "DROP VIEW IF EXISTS `view_article__blog`");
        assert!(plan.statements[1].starts_with("CREATE OR REPLACE VIEW `view_article__blog` AS"));
        assert_eq!(plan.statements[2], "DROP VIEW IF EXISTS `view_article__blog__meta`");
        assert!(plan.statements[3].starts_with("CREATE OR REPLACE VIEW `view_article__blog__meta` AS"));

        // planning executes nothing
        assert!(db.views().is_empty());
    }

    #[tokio::test]
    async fn test_plan_without_transactional_ddl_has_no_separate_drop() {
        let db = database();
        let connection = Arc::new(AutocommitDdl(db.connect()));
        let generator = generator(connection, GeneratorSettings::new().create_meta_views(false));

        let plan = generator
            .plan_view_for_bundle("article", "blog")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(plan.meta_view_name, None);
        assert_eq!(plan.statements.len(), 2);
        assert!(plan.statements[0].starts_with("CREATE OR REPLACE VIEW `view_article__blog`"));
        assert_eq!(plan.statements[1], "DROP VIEW IF EXISTS `view_article__blog__meta`");
    }

    #[tokio::test]
    async fn test_failed_create_without_transactional_ddl_keeps_old_view() {
        let db = database();
        let generator = generator(
            Arc::new(AutocommitDdl(db.connect())),
            GeneratorSettings::default(),
        );
        assert!(generator.create_view_for_bundle("article", "blog").await.is_some());
        let before = db.view_definition("view_article__blog");

        db.fail_on("CREATE OR REPLACE VIEW `view_article__blog` AS");
        assert_eq!(generator.create_view_for_bundle("article", "blog").await, None);
        assert_eq!(db.view_definition("view_article__blog"), before);
        assert!(
            !db.statements()
                .iter()
                .any(|s| s == "DROP VIEW IF EXISTS `view_article__blog`")
        );
    }

    #[tokio::test]
    async fn test_session_cap_is_set() {
        let db = database();
        let connection = Arc::new(db.connect());
        let generator = generator(
            connection.clone(),
            GeneratorSettings::new().group_concat_max_len(4096),
        );

        generator.create_view_for_bundle("article", "blog").await;
        assert_eq!(connection.session_variable("group_concat_max_len"), Some(4096));

        let statements = db.statements();
        let set = statements.iter().position(|s| s.starts_with("SET SESSION")).unwrap();
        let begin = statements.iter().position(|s| s == "START TRANSACTION").unwrap();
        assert!(set < begin);
    }

    #[tokio::test]
    async fn test_unknown_kind() {
        let generator = generator(Arc::new(database().connect()), GeneratorSettings::default());
        assert_eq!(generator.create_view_for_bundle("comment", "x").await, None);
        assert!(generator.plan_view_for_bundle("comment", "x").await.unwrap().is_none());
    }
}
