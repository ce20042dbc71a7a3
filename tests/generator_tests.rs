use entity_views::{
    AttributeDefinition, BundleSpec, Connection, Driver, EntityKind, GeneratorSettings,
    MemoryDatabase, OrderMode, SharedConfig, StaticCatalogue, StaticConfig, ViewError, ViewGenerator,
    meta_view_name, view_name,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use std::sync::Arc;
use std::time::Duration;

const SATELLITE_COLUMNS: [&str; 6] = ["bundle", "deleted", "entity_id", "revision_id", "langcode", "delta"];

fn satellite(value_columns: &[&'static str]) -> Vec<&'static str> {
    let mut columns = SATELLITE_COLUMNS.to_vec();
    columns.extend_from_slice(value_columns);
    columns
}

fn database() -> MemoryDatabase {
    MemoryDatabase::new("cms")
        .with_table(
            "article",
            &["id", "langcode", "type", "title", "uid", "status", "created", "changed"],
        )
        .with_table("article__tags", &satellite(&["target_id"]))
        .with_table("article__body", &satellite(&["value", "summary", "format"]))
        .with_table(
            "media",
            &["mid", "langcode", "bundle", "uid", "status", "created", "changed"],
        )
        .with_table("media__image", &satellite(&["target_id", "alt", "width", "height"]))
}

fn article() -> EntityKind {
    EntityKind::new("article")
        .base_table("article")
        .id_key("id")
        .bundle_entity_type("article_type")
}

fn media() -> EntityKind {
    EntityKind::new("media")
        .base_table("media")
        .id_key("mid")
        .bundle_entity_type("media_type")
        .bundle_key("bundle")
}

fn catalogue() -> StaticCatalogue {
    StaticCatalogue::new()
        .with_kind(
            article(),
            vec![
                BundleSpec::new("blog")
                    .attribute(AttributeDefinition::new("tags", "Tags"))
                    .attribute(AttributeDefinition::new("body", "Body").description("Main text"))
                    .attribute(AttributeDefinition::new("related", "Related")),
                BundleSpec::new("news").attribute(AttributeDefinition::new("tags", "Tags")),
            ],
        )
        .with_kind(
            media(),
            vec![BundleSpec::new("image").attribute(AttributeDefinition::new("image", "Image"))],
        )
        // no id key
        .with_kind(
            EntityKind::new("user")
                .base_table("users_field_data")
                .bundle_entity_type("user_type"),
            vec![BundleSpec::new("user")],
        )
        // no bundle concept
        .with_kind(
            EntityKind::new("file").base_table("file_managed").id_key("fid"),
            vec![],
        )
}

fn generator_with(db: &MemoryDatabase, catalogue: StaticCatalogue, settings: GeneratorSettings) -> ViewGenerator {
    ViewGenerator::new(
        Arc::new(db.connect()),
        Arc::new(catalogue),
        Arc::new(StaticConfig::new(settings)),
    )
}

fn generator(db: &MemoryDatabase) -> ViewGenerator {
    generator_with(db, catalogue(), GeneratorSettings::default())
}

fn parses(sql: &str) -> bool {
    Parser::parse_sql(&MySqlDialect {}, sql).is_ok()
}

#[tokio::test]
async fn test_create_view_for_bundle() -> anyhow::Result<()> {
    let db = database();
    let generator = generator(&db);

    let created = generator.create_view_for_bundle("article", "blog").await;
    assert_eq!(created.as_deref(), Some("view_article__blog"));
    assert_eq!(db.views(), vec!["view_article__blog", "view_article__blog__meta"]);

    let definition = db.view_definition("view_article__blog").unwrap();
    assert!(definition.contains("`article`.`id` AS `id`"));
    assert!(definition.contains("`article`.`title`"));
    assert!(definition.contains(
        "GROUP_CONCAT(COALESCE(`target_id`, `entity_id`) ORDER BY `delta` SEPARATOR ' / ') AS `tags`"
    ));
    assert!(definition.contains("COALESCE(`value`, `entity_id`, `format`)"));
    assert!(definition.contains("WHERE `deleted` = 0"));
    assert!(definition.ends_with("WHERE `article`.`type` = 'blog'"));

    // no satellite table
    assert!(!definition.contains("`related`"));

    // catalogue order
    let tags = definition.find("AS `tags`").unwrap();
    let body = definition.find("AS `body`").unwrap();
    assert!(tags < body);

    Ok(())
}

#[tokio::test]
async fn test_ineligible_kinds_yield_nothing() -> anyhow::Result<()> {
    let db = database();
    let generator = generator(&db);

    assert_eq!(generator.create_view_for_bundle("user", "user").await, None);
    assert_eq!(generator.create_view_for_bundle("comment", "default").await, None);
    assert!(db.views().is_empty());

    // eligible without a bundle concept: single bundle views still work
    db.create_table(
        "file_managed",
        &["fid", "langcode", "type", "uid", "status", "created", "changed"],
    );
    assert_eq!(
        generator.create_view_for_bundle("file", "document").await.as_deref(),
        Some("view_file__document")
    );
    Ok(())
}

#[tokio::test]
async fn test_title_column_is_detected() -> anyhow::Result<()> {
    let db = database();
    let generator = generator(&db);

    let plan = generator
        .plan_view_for_bundle("media", "image")
        .await?
        .expect("media is eligible");
    assert_eq!(
        plan.columns,
        vec!["id", "langcode", "bundle", "uid", "status", "created", "changed", "image"]
    );
    assert!(plan.statements[1].contains("`media`.`mid` AS `id`"));
    assert!(plan.statements[1].contains("COALESCE(`target_id`, `entity_id`, `width`, `height`)"));
    Ok(())
}

#[tokio::test]
async fn test_create_is_idempotent() -> anyhow::Result<()> {
    let db = database();
    let generator = generator(&db);

    generator.create_view_for_bundle("article", "blog").await;
    let first = db.catalog();

    generator.create_view_for_bundle("article", "blog").await;
    assert_eq!(db.catalog(), first);
    assert_eq!(db.views().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_drop_view_for_bundle() -> anyhow::Result<()> {
    let db = database();
    let generator = generator(&db);
    let conn = db.connect();
    conn.execute("CREATE VIEW report AS SELECT id FROM article").await?;

    // absent views are fine
    generator.drop_view_for_bundle("article", "blog").await?;

    generator.create_view_for_bundle("article", "blog").await;
    generator.create_view_for_bundle("article", "news").await;
    generator.drop_view_for_bundle("article", "blog").await?;

    assert_eq!(
        db.views(),
        vec!["report", "view_article__news", "view_article__news__meta"]
    );
    Ok(())
}

#[tokio::test]
async fn test_registry_completeness() -> anyhow::Result<()> {
    let db = database();
    let generator = generator(&db);
    let conn = db.connect();
    conn.execute("CREATE VIEW view_summary AS SELECT id FROM article").await?;
    conn.execute("CREATE VIEW viewxarticle__blog AS SELECT id FROM article").await?;

    let created = generator.rebuild_all().await;
    assert_eq!(
        created,
        vec!["view_article__blog", "view_article__news", "view_media__image"]
    );

    let mut expected: Vec<String> = [("article", "blog"), ("article", "news"), ("media", "image")]
        .iter()
        .flat_map(|(k, b)| [view_name(k, b), meta_view_name(k, b)])
        .collect();
    expected.sort();
    assert_eq!(generator.list_managed_views().await?, expected);

    generator.drop_all().await?;
    assert!(generator.list_managed_views().await?.is_empty());
    assert_eq!(db.views(), vec!["view_summary", "viewxarticle__blog"]);
    Ok(())
}

#[tokio::test]
async fn test_registry_without_meta_views() -> anyhow::Result<()> {
    let db = database();
    let generator = generator_with(
        &db,
        catalogue(),
        GeneratorSettings::new().create_meta_views(false),
    );

    generator.rebuild_all().await;
    assert_eq!(
        generator.list_managed_views().await?,
        vec!["view_article__blog", "view_article__news", "view_media__image"]
    );
    Ok(())
}

#[tokio::test]
async fn test_meta_view_rows() -> anyhow::Result<()> {
    let db = database();
    let generator = generator(&db);
    generator.create_view_for_bundle("article", "blog").await;

    let meta = db.view_definition("view_article__blog__meta").unwrap();
    assert!(meta.contains("SELECT 'tags' AS `column_name`, 'Tags' AS `comment`, 'field:tags' AS `source`"));
    assert!(meta.contains("SELECT 'body' AS `column_name`, 'Body: Main text' AS `comment`, 'field:body' AS `source`"));
    assert!(meta.contains("SELECT 'type' AS `column_name`, 'Bundle machine name' AS `comment`, 'base' AS `source`"));
    assert!(meta.contains("SELECT 'title' AS `column_name`, 'Title' AS `comment`, 'base' AS `source`"));
    // only columns the view actually has
    assert!(!meta.contains("'related'"));
    assert!(parses(&meta));
    Ok(())
}

#[tokio::test]
async fn test_failed_create_keeps_previous_view() -> anyhow::Result<()> {
    let db = database();
    let generator = generator(&db);
    generator.create_view_for_bundle("article", "blog").await;
    let before = db.catalog();

    db.fail_on("CREATE OR REPLACE VIEW `view_article__blog__meta`");
    assert_eq!(generator.create_view_for_bundle("article", "blog").await, None);
    assert_eq!(db.catalog(), before);

    db.clear_failures();
    db.fail_on("CREATE OR REPLACE VIEW `view_article__blog` AS");
    let err = generator
        .try_create_view_for_bundle("article", "blog")
        .await
        .unwrap_err();
    assert!(matches!(err, ViewError::Database(_)));
    assert_eq!(db.catalog(), before);
    Ok(())
}

#[tokio::test]
async fn test_batch_continues_past_failures() -> anyhow::Result<()> {
    let db = database();
    let generator = generator(&db);
    db.fail_on("VIEW `view_article__news` AS");

    let report = generator.rebuild_all_report().await?;
    assert_eq!(report.created, vec!["view_article__blog", "view_media__image"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].entity_kind, "article");
    assert_eq!(report.failed[0].bundle, "news");
    assert!(report.failed[0].reason.contains("Injected failure"));

    assert!(!db.has_view("view_article__news"));
    assert!(!db.has_view("view_article__news__meta"));
    Ok(())
}

#[tokio::test]
async fn test_missing_base_table_fails_bundle() -> anyhow::Result<()> {
    let db = database();
    db.drop_table("media");
    let generator = generator(&db);

    let report = generator.rebuild_all_report().await?;
    assert_eq!(report.created, vec!["view_article__blog", "view_article__news"]);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].reason.contains("doesn't exist"));
    Ok(())
}

#[tokio::test]
async fn test_overlong_name_fails_bundle() -> anyhow::Result<()> {
    let db = database();
    let long = "b".repeat(60);
    let catalogue = StaticCatalogue::new().with_kind(article(), vec![BundleSpec::new(&long)]);
    let generator = generator_with(&db, catalogue, GeneratorSettings::default());

    let report = generator.rebuild_all_report().await?;
    assert!(report.created.is_empty());
    assert!(report.failed[0].reason.contains("longer than 64"));

    // nothing to drop either
    generator.drop_view_for_bundle("article", &long).await?;
    Ok(())
}

#[tokio::test]
async fn test_unsupported_driver_is_a_noop() -> anyhow::Result<()> {
    let db = database().with_driver(Driver::Other("pgsql".to_string()));
    let generator = generator(&db);

    assert!(generator.rebuild_all().await.is_empty());
    assert_eq!(generator.create_view_for_bundle("article", "blog").await, None);
    assert!(generator.plan_view_for_bundle("article", "blog").await?.is_none());
    assert!(generator.list_managed_views().await?.is_empty());
    generator.drop_view_for_bundle("article", "blog").await?;
    generator.drop_all().await?;
    assert!(generator.prune_orphans().await?.is_empty());

    assert!(db.statements().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_disabling_meta_views_drops_stale_meta() -> anyhow::Result<()> {
    let db = database();
    let config = SharedConfig::default();
    let generator = ViewGenerator::new(
        Arc::new(db.connect()),
        Arc::new(catalogue()),
        Arc::new(config.clone()),
    );

    generator.create_view_for_bundle("article", "blog").await;
    assert!(db.has_view("view_article__blog__meta"));

    config.update(|s| s.create_meta_views = false)?;
    generator.create_view_for_bundle("article", "blog").await;
    assert_eq!(db.views(), vec!["view_article__blog"]);
    Ok(())
}

#[tokio::test]
async fn test_settings_are_read_per_call() -> anyhow::Result<()> {
    let db = database();
    let config = SharedConfig::default();
    let generator = ViewGenerator::new(
        Arc::new(db.connect()),
        Arc::new(catalogue()),
        Arc::new(config.clone()),
    );

    config.update(|s| {
        s.separator = ", ".to_string();
        s.order_multi_values = OrderMode::Value;
    })?;
    generator.create_view_for_bundle("article", "news").await;

    let definition = db.view_definition("view_article__news").unwrap();
    assert!(definition.contains("ORDER BY COALESCE(`target_id`, `entity_id`) SEPARATOR ', '"));
    Ok(())
}

#[tokio::test]
async fn test_prune_orphans() -> anyhow::Result<()> {
    let db = database();
    generator(&db).rebuild_all().await;

    let shrunk = StaticCatalogue::new().with_kind(
        article(),
        vec![BundleSpec::new("blog").attribute(AttributeDefinition::new("tags", "Tags"))],
    );
    let generator = generator_with(&db, shrunk, GeneratorSettings::default());

    let pruned = generator.prune_orphans().await?;
    assert_eq!(
        pruned,
        vec![
            "view_article__news",
            "view_article__news__meta",
            "view_media__image",
            "view_media__image__meta",
        ]
    );
    assert_eq!(db.views(), vec!["view_article__blog", "view_article__blog__meta"]);
    Ok(())
}

#[tokio::test]
async fn test_prune_drops_meta_views_when_disabled() -> anyhow::Result<()> {
    let db = database();
    generator(&db).create_view_for_bundle("article", "blog").await;

    let generator = generator_with(
        &db,
        catalogue(),
        GeneratorSettings::new().create_meta_views(false),
    );
    assert_eq!(generator.prune_orphans().await?, vec!["view_article__blog__meta"]);
    Ok(())
}

#[tokio::test]
async fn test_same_bundle_waits_for_lock() -> anyhow::Result<()> {
    let db = database();
    let holder = db.connect();
    assert!(
        holder
            .try_advisory_lock("entity_views:view_article__blog", Duration::ZERO)
            .await?
    );

    let generator = generator_with(
        &db,
        catalogue(),
        GeneratorSettings::new().lock_timeout(Duration::ZERO),
    );
    let err = generator
        .try_create_view_for_bundle("article", "blog")
        .await
        .unwrap_err();
    assert!(matches!(err, ViewError::Lock(_)));
    assert!(!db.has_view("view_article__blog"));

    // other bundles are not blocked
    assert!(generator.create_view_for_bundle("article", "news").await.is_some());

    holder.release_advisory_lock("entity_views:view_article__blog").await?;
    assert!(generator.create_view_for_bundle("article", "blog").await.is_some());
    Ok(())
}

#[tokio::test]
async fn test_lock_is_released_after_failure() -> anyhow::Result<()> {
    let db = database();
    let generator = generator(&db);
    db.fail_on("VIEW `view_article__blog` AS");
    assert_eq!(generator.create_view_for_bundle("article", "blog").await, None);

    let other = db.connect();
    assert!(
        other
            .try_advisory_lock("entity_views:view_article__blog", Duration::ZERO)
            .await?
    );
    Ok(())
}

#[tokio::test]
async fn test_bundles_by_entity_type() -> anyhow::Result<()> {
    let db = database();
    let generator = generator(&db);

    let bundles = generator.bundles_by_entity_type().await?;
    let kinds: Vec<&str> = bundles.keys().map(String::as_str).collect();
    assert_eq!(kinds, vec!["article", "media"]);
    assert_eq!(bundles["article"], vec!["blog", "news"]);

    let supported: Vec<String> = generator
        .supported_entity_kinds()?
        .into_iter()
        .map(|k| k.name)
        .collect();
    assert_eq!(supported, vec!["article", "media"]);
    Ok(())
}

#[tokio::test]
async fn test_views_without_attributes_are_well_formed() -> anyhow::Result<()> {
    let db = database();
    let catalogue = StaticCatalogue::new().with_kind(article(), vec![BundleSpec::new("page")]);
    let generator = generator_with(&db, catalogue, GeneratorSettings::default());

    generator.rebuild_all().await;
    let definition = db.view_definition("view_article__page").unwrap();
    assert!(!definition.contains("LEFT JOIN"));
    assert!(parses(&definition));
    Ok(())
}
