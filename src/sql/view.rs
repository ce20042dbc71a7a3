use super::aggregate::AggregateQuery;
use super::quote::{quote_identifier, quote_literal, quote_qualified};
use crate::config::GeneratorSettings;
use crate::core::{BaseStorage, Result};

const TRAILING_BASE_COLUMNS: [&str; 4] = ["uid", "status", "created", "changed"];

/// One flattened view: base columns of one bundle plus one aggregated column
/// per attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDefinition {
    pub name: String,
    pub base_table: String,
    pub id_key: String,
    pub bundle_key: String,
    pub bundle: String,
    /// Base table has a `title` column
    pub include_title: bool,
    /// In catalogue order
    pub attributes: Vec<AggregateQuery>,
}

impl ViewDefinition {
    pub fn new(name: &str, storage: BaseStorage<'_>, bundle: &str) -> Self {
        Self {
            name: name.to_string(),
            base_table: storage.table.to_string(),
            id_key: storage.id_key.to_string(),
            bundle_key: storage.bundle_key.to_string(),
            bundle: bundle.to_string(),
            include_title: false,
            attributes: Vec::new(),
        }
    }

    pub fn with_title(mut self, include: bool) -> Self {
        self.include_title = include;
        self
    }

    pub fn push_attribute(&mut self, aggregate: AggregateQuery) {
        self.attributes.push(aggregate);
    }

    /// Output names of the base columns:
    /// `id, langcode, <bundle key>, [title,] uid, status, created, changed`
    pub fn base_columns(&self) -> Vec<String> {
        let mut columns = vec!["id".to_string(), "langcode".to_string(), self.bundle_key.clone()];
        if self.include_title {
            columns.push("title".to_string());
        }
        columns.extend(TRAILING_BASE_COLUMNS.iter().map(|c| c.to_string()));
        columns
    }

    /// Every output column, base columns first
    pub fn output_columns(&self) -> Vec<String> {
        let mut columns = self.base_columns();
        columns.extend(self.attributes.iter().map(|a| a.column().to_string()));
        columns
    }

    pub fn drop_sql(&self) -> Result<String> {
        super::drop_view_sql(&self.name)
    }

    pub fn create_sql(&self, settings: &GeneratorSettings) -> Result<String> {
        let bt = quote_identifier(&self.base_table)?;
        let id = quote_qualified(&self.base_table, &self.id_key)?;
        let langcode = quote_qualified(&self.base_table, "langcode")?;

        let mut selects = vec![format!("{} AS `id`", id)];
        for column in self.base_columns().iter().skip(1) {
            selects.push(quote_qualified(&self.base_table, column)?);
        }

        let mut joins = Vec::with_capacity(self.attributes.len());
        for aggregate in &self.attributes {
            let alias = quote_identifier(&aggregate.alias())?;
            let column = quote_identifier(aggregate.column())?;
            joins.push(format!(
                "LEFT JOIN ({subquery}) AS {alias}\n  ON {alias}.`entity_id` = {id}\n  AND {alias}.`langcode` = {langcode}",
                subquery = aggregate.to_sql(settings)?,
            ));
            selects.push(format!("{}.{} AS {}", alias, column, column));
        }

        let mut sql = format!(
            "CREATE OR REPLACE VIEW {} AS\nSELECT\n  {}\nFROM {}",
            quote_identifier(&self.name)?,
            selects.join(",\n  "),
            bt
        );
        for join in joins {
            sql.push('\n');
            sql.push_str(&join);
        }
        sql.push_str(&format!(
            "\nWHERE {} = {}",
            quote_qualified(&self.base_table, &self.bundle_key)?,
            quote_literal(&self.bundle)
        ));
        Ok(sql)
    }
}
