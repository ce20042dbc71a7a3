//! SQL text for flattened views. Pure builders: nothing here touches a
//! connection.

pub mod aggregate;
pub mod meta;
pub mod quote;
pub mod view;

pub use aggregate::AggregateQuery;
pub use meta::{MetaRow, MetaViewDefinition};
pub use quote::{escape_like, quote_identifier, quote_literal, quote_qualified, validate_identifier};
pub use view::ViewDefinition;

use crate::core::Result;

/// `DROP VIEW IF EXISTS <name>`
pub fn drop_view_sql(name: &str) -> Result<String> {
    Ok(format!("DROP VIEW IF EXISTS {}", quote_identifier(name)?))
}
