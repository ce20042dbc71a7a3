use super::GeneratorSettings;
use crate::core::{Result, ViewError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Source of generator settings.
///
/// Stores are read once per public generator operation; nothing is cached
/// between calls.
pub trait ConfigStore: Send + Sync {
    fn snapshot(&self) -> Result<GeneratorSettings>;
}

/// Fixed settings
#[derive(Debug, Clone, Default)]
pub struct StaticConfig {
    settings: GeneratorSettings,
}

impl StaticConfig {
    pub fn new(settings: GeneratorSettings) -> Self {
        Self { settings }
    }
}

impl ConfigStore for StaticConfig {
    fn snapshot(&self) -> Result<GeneratorSettings> {
        Ok(self.settings.clone())
    }
}

/// Settings that can be changed at runtime by an admin surface.
/// Clones share the same underlying settings.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    settings: Arc<RwLock<GeneratorSettings>>,
}

impl SharedConfig {
    pub fn new(settings: GeneratorSettings) -> Self {
        Self {
            settings: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut GeneratorSettings),
    {
        let mut guard = self.settings.write()?;
        f(&mut *guard);
        Ok(())
    }

    pub fn replace(&self, settings: GeneratorSettings) -> Result<()> {
        *self.settings.write()? = settings;
        Ok(())
    }
}

impl ConfigStore for SharedConfig {
    fn snapshot(&self) -> Result<GeneratorSettings> {
        Ok(self.settings.read()?.clone())
    }
}

/// JSON settings file, re-read on every snapshot. A missing file yields
/// defaults.
#[derive(Debug, Clone)]
pub struct JsonFileConfig {
    path: PathBuf,
}

impl JsonFileConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonFileConfig {
    fn snapshot(&self) -> Result<GeneratorSettings> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => GeneratorSettings::from_json(&json).map_err(|e| {
                ViewError::Config(format!("{}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GeneratorSettings::default()),
            Err(e) => Err(e.into()),
        }
    }
}
