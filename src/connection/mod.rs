pub mod config;
pub mod memory;
#[cfg(feature = "mysql")]
pub mod mysql;

use crate::core::{Result, ViewError};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

pub use config::ConnectionConfig;
pub use memory::{MemoryConnection, MemoryDatabase};
#[cfg(feature = "mysql")]
pub use mysql::MySqlConnection;

/// Database driver family behind a [`Connection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Driver {
    /// MySQL and MySQL-compatible engines (MariaDB, Percona, ...)
    MySql,
    Other(String),
}

impl Driver {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Driver::MySql,
            other => Driver::Other(other.to_string()),
        }
    }

    /// Only the MySQL family is supported by the view generator.
    pub fn is_supported(&self) -> bool {
        matches!(self, Driver::MySql)
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Driver::MySql => write!(f, "mysql"),
            Driver::Other(name) => write!(f, "{}", name),
        }
    }
}

/// One database session as seen by the view generator.
///
/// Transactions and session variables are scoped to the session, so an
/// implementation must run every call on the same underlying connection.
#[async_trait]
pub trait Connection: Send + Sync {
    fn driver(&self) -> Driver;

    /// Active database (schema) name
    fn database_name(&self) -> &str;

    /// Whether `ROLLBACK` undoes DDL. MySQL commits implicitly before and
    /// after every DDL statement, so it does not.
    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    /// Execute one statement, discarding any result set
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Run a query with positional `?` parameters and return its first
    /// column as strings
    async fn fetch_strings(&self, sql: &str, params: &[&str]) -> Result<Vec<String>>;

    async fn begin(&self) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;

    /// `SET SESSION <name> = <value>`
    async fn set_session_variable(&self, name: &str, value: u64) -> Result<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ViewError::InvalidIdentifier(
                name.to_string(),
                "not a session variable name".to_string(),
            ));
        }
        self.execute(&format!("SET SESSION {} = {}", name, value)).await
    }

    /// Acquire a named, session-scoped lock. Returns `false` on timeout.
    async fn try_advisory_lock(&self, name: &str, timeout: Duration) -> Result<bool>;

    async fn release_advisory_lock(&self, name: &str) -> Result<()>;
}
