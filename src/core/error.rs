use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("Unsupported database driver: {0}")]
    UnsupportedDriver(String),

    #[error("Invalid identifier '{0}': {1}")]
    InvalidIdentifier(String, String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalogue error: {0}")]
    Catalogue(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, ViewError>;

impl<T> From<std::sync::PoisonError<T>> for ViewError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

impl From<std::io::Error> for ViewError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ViewError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

#[cfg(feature = "mysql")]
impl From<sqlx::Error> for ViewError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}
