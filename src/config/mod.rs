//! Generator settings.
//!
//! Settings are read as one immutable [`GeneratorSettings`] snapshot per
//! public operation and passed down by reference, so a single view's
//! statements are always built from consistent values.

pub mod store;

pub use store::{ConfigStore, JsonFileConfig, SharedConfig, StaticConfig};

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default session cap for `GROUP_CONCAT` results, in bytes.
pub const DEFAULT_GROUP_CONCAT_MAX_LEN: u64 = 1_048_576;

/// Default string placed between aggregated values.
pub const DEFAULT_SEPARATOR: &str = " / ";

/// Ordering of values inside one aggregated column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum OrderMode {
    /// Satellite row delta, ascending
    #[default]
    Delta,
    /// Selected value, ascending
    Value,
    /// Database default order
    None,
}

impl FromStr for OrderMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "delta" => OrderMode::Delta,
            "value" => OrderMode::Value,
            _ => OrderMode::None,
        })
    }
}

impl From<String> for OrderMode {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(mode) => mode,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for OrderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderMode::Delta => write!(f, "delta"),
            OrderMode::Value => write!(f, "value"),
            OrderMode::None => write!(f, "none"),
        }
    }
}

fn default_group_concat_max_len() -> u64 {
    DEFAULT_GROUP_CONCAT_MAX_LEN
}

/// Negative caps are clamped to zero.
fn deserialize_max_len<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = i64::deserialize(deserializer)?;
    Ok(value.max(0) as u64)
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

fn default_create_meta_views() -> bool {
    true
}

fn default_lock_timeout_secs() -> Option<u64> {
    Some(10)
}

/// View generation settings
///
/// Field names match the keys of the host platform's settings object, so a
/// JSON export of those settings deserializes directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// Session `group_concat_max_len` applied before each view is built
    #[serde(
        default = "default_group_concat_max_len",
        deserialize_with = "deserialize_max_len"
    )]
    pub group_concat_max_len: u64,

    /// String placed between aggregated values
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Ordering of aggregated values
    #[serde(default)]
    pub order_multi_values: OrderMode,

    /// Whether a `<view>__meta` companion view is produced
    #[serde(default = "default_create_meta_views")]
    pub create_meta_views: bool,

    /// Per-bundle advisory lock timeout; `None` disables locking
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: Option<u64>,
}

impl GeneratorSettings {
    pub fn new() -> Self {
        Self {
            group_concat_max_len: DEFAULT_GROUP_CONCAT_MAX_LEN,
            separator: default_separator(),
            order_multi_values: OrderMode::Delta,
            create_meta_views: default_create_meta_views(),
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }

    /// Set the session concatenation cap
    pub fn group_concat_max_len(mut self, max_len: u64) -> Self {
        self.group_concat_max_len = max_len;
        self
    }

    /// Set the value separator
    pub fn separator(mut self, separator: &str) -> Self {
        self.separator = separator.to_string();
        self
    }

    /// Set the multi-value ordering
    pub fn order_multi_values(mut self, order: OrderMode) -> Self {
        self.order_multi_values = order;
        self
    }

    /// Enable or disable meta views
    pub fn create_meta_views(mut self, enabled: bool) -> Self {
        self.create_meta_views = enabled;
        self
    }

    /// Set the advisory lock timeout, rounded up to whole seconds
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_millis().div_ceil(1000);
        self.lock_timeout_secs = Some(u64::try_from(secs).unwrap_or(u64::MAX));
        self
    }

    /// Disable per-bundle advisory locking
    pub fn without_lock(mut self) -> Self {
        self.lock_timeout_secs = None;
        self
    }

    pub fn lock_timeout_duration(&self) -> Option<Duration> {
        self.lock_timeout_secs.map(Duration::from_secs)
    }

    /// Parse from a JSON settings object; missing keys take defaults
    pub fn from_json(json: &str) -> crate::core::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self::new()
    }
}
