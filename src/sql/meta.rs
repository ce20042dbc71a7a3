//! Companion `<view>__meta` views.
//!
//! MySQL keeps no column comments for views, so each flattened view gets a
//! sibling listing `(column_name, comment, source)` for every output column.

use super::quote::{quote_identifier, quote_literal};
use super::view::ViewDefinition;
use crate::core::Result;

/// Description of a base column, keyed by output name.
fn base_column_comment(column: &str, bundle_key: &str) -> &'static str {
    match column {
        "id" => "Entity ID",
        "langcode" => "Language code",
        "uid" => "Author user ID",
        "status" => "Published (1) / Unpublished (0)",
        "created" => "Created timestamp (Unix)",
        "changed" => "Updated timestamp (Unix)",
        "title" => "Title",
        c if c == bundle_key => "Bundle machine name",
        _ => "",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRow {
    pub column_name: String,
    pub comment: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaViewDefinition {
    pub name: String,
    /// In the described view's column order
    pub rows: Vec<MetaRow>,
}

impl MetaViewDefinition {
    pub fn for_view(name: &str, view: &ViewDefinition) -> Self {
        let base = view.base_columns().into_iter().map(|column| MetaRow {
            comment: base_column_comment(&column, &view.bundle_key).to_string(),
            column_name: column,
            source: "base".to_string(),
        });
        let attributes = view.attributes.iter().map(|aggregate| MetaRow {
            column_name: aggregate.attribute.name.clone(),
            comment: aggregate.attribute.comment(),
            source: format!("field:{}", aggregate.attribute.name),
        });

        Self {
            name: name.to_string(),
            rows: base.chain(attributes).collect(),
        }
    }

    pub fn drop_sql(&self) -> Result<String> {
        super::drop_view_sql(&self.name)
    }

    pub fn create_sql(&self) -> Result<String> {
        let selects: Vec<String> = self
            .rows
            .iter()
            .map(|row| {
                format!(
                    "SELECT {} AS `column_name`, {} AS `comment`, {} AS `source`",
                    quote_literal(&row.column_name),
                    quote_literal(&row.comment),
                    quote_literal(&row.source)
                )
            })
            .collect();

        Ok(format!(
            "CREATE OR REPLACE VIEW {} AS\n{}",
            quote_identifier(&self.name)?,
            selects.join("\nUNION ALL\n")
        ))
    }
}
