pub mod error;
pub mod types;

pub use error::{Result, ViewError};
pub use types::{AttributeDefinition, BaseStorage, EntityKind, ViewTarget};
