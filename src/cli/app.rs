use super::{Cli, Command};
use anyhow::{Context, Result, anyhow};
use entity_views::{
    ConfigStore, Connection, GeneratorSettings, JsonFileConfig, MemoryDatabase, StaticCatalogue,
    StaticConfig, ViewGenerator,
};
use std::sync::Arc;

const OFFLINE_DATABASE: &str = "offline";

pub struct App {
    generator: ViewGenerator,
    config: Arc<dyn ConfigStore>,
}

impl App {
    pub async fn new(cli: &Cli) -> Result<Self> {
        let catalogue = match &cli.catalogue {
            Some(path) => StaticCatalogue::load(path)
                .with_context(|| format!("Failed to load catalogue '{}'", path.display()))?,
            None => StaticCatalogue::new(),
        };

        let config: Arc<dyn ConfigStore> = match &cli.config {
            Some(path) => Arc::new(JsonFileConfig::new(path)),
            None => Arc::new(StaticConfig::new(GeneratorSettings::default())),
        };

        let connection: Arc<dyn Connection> = match &cli.url {
            Some(url) => connect(url).await?,
            None if cli.command.works_offline() => {
                let db = MemoryDatabase::new(OFFLINE_DATABASE);
                catalogue.seed(&db);
                Arc::new(db.connect())
            }
            None => {
                return Err(anyhow!(
                    "No database URL given (use --url or ENTITY_VIEWS_URL)"
                ));
            }
        };

        Ok(Self {
            generator: ViewGenerator::new(connection, Arc::new(catalogue), config.clone()),
            config,
        })
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::List => self.list().await,
            Command::Bundles => self.bundles().await,
            Command::Rebuild => self.rebuild().await,
            Command::Create { entity_kind, bundle } => self.create(&entity_kind, &bundle).await,
            Command::Drop { entity_kind, bundle } => self.drop(&entity_kind, &bundle).await,
            Command::DropAll => {
                self.generator
                    .drop_all()
                    .await
                    .context("Failed to drop managed views")?;
                println!("All managed views were deleted.");
                Ok(())
            }
            Command::Prune => self.prune().await,
            Command::Plan {
                entity_kind,
                bundle,
                json,
            } => self.plan(&entity_kind, &bundle, json).await,
        }
    }

    fn meta_enabled(&self) -> Result<bool> {
        Ok(self.config.snapshot()?.create_meta_views)
    }

    fn created_message(&self, view: &str) -> Result<String> {
        Ok(if self.meta_enabled()? {
            format!("Created/updated: {} (+ meta)", view)
        } else {
            format!("Created/updated: {}", view)
        })
    }

    async fn list(&self) -> Result<()> {
        let views = self
            .generator
            .list_managed_views()
            .await
            .context("Failed to list managed views")?;
        if views.is_empty() {
            println!("No managed views.");
        }
        for view in views {
            println!("{}", view);
        }
        Ok(())
    }

    async fn bundles(&self) -> Result<()> {
        let bundles = self.generator.bundles_by_entity_type().await?;
        if bundles.is_empty() {
            println!("No flattenable entity kinds.");
        }
        for (kind, names) in bundles {
            println!("{}: {}", kind, names.join(", "));
        }
        Ok(())
    }

    async fn rebuild(&self) -> Result<()> {
        let report = self
            .generator
            .rebuild_all_report()
            .await
            .context("Rebuild aborted")?;

        for view in &report.created {
            println!("{}", self.created_message(view)?);
        }
        for failure in &report.failed {
            eprintln!("Failed: {}", failure);
        }
        println!("Rebuilt {} views.", report.created.len());

        if !report.is_complete() {
            return Err(anyhow!("{} bundle(s) failed", report.failed.len()));
        }
        Ok(())
    }

    async fn create(&self, entity_kind: &str, bundle: &str) -> Result<()> {
        let created = self
            .generator
            .try_create_view_for_bundle(entity_kind, bundle)
            .await
            .with_context(|| format!("Failed to create view for {}/{}", entity_kind, bundle))?;

        match created {
            Some(view) => println!("{}", self.created_message(&view)?),
            None => println!(
                "Nothing to do: '{}' is not an eligible entity kind for this database.",
                entity_kind
            ),
        }
        Ok(())
    }

    async fn drop(&self, entity_kind: &str, bundle: &str) -> Result<()> {
        self.generator
            .drop_view_for_bundle(entity_kind, bundle)
            .await
            .with_context(|| format!("Failed to drop view for {}/{}", entity_kind, bundle))?;
        println!("Deleted view {}.", entity_views::view_name(entity_kind, bundle));
        Ok(())
    }

    async fn prune(&self) -> Result<()> {
        let pruned = self
            .generator
            .prune_orphans()
            .await
            .context("Failed to prune views")?;
        for view in &pruned {
            println!("Deleted view {}.", view);
        }
        println!("Pruned {} views.", pruned.len());
        Ok(())
    }

    async fn plan(&self, entity_kind: &str, bundle: &str, json: bool) -> Result<()> {
        let plan = self
            .generator
            .plan_view_for_bundle(entity_kind, bundle)
            .await
            .with_context(|| format!("Failed to plan view for {}/{}", entity_kind, bundle))?
            .ok_or_else(|| {
                anyhow!("'{}' is not an eligible entity kind for this database", entity_kind)
            })?;

        if json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            print!("{}", plan.to_script());
        }
        Ok(())
    }
}

#[cfg(feature = "mysql")]
async fn connect(url: &str) -> Result<Arc<dyn Connection>> {
    let connection = entity_views::MySqlConnection::connect_url(url)
        .await
        .context("Failed to connect to database")?;
    Ok(Arc::new(connection))
}

#[cfg(not(feature = "mysql"))]
async fn connect(_url: &str) -> Result<Arc<dyn Connection>> {
    Err(anyhow!("Built without MySQL support (enable the `mysql` feature)"))
}
