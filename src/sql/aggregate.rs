use super::quote::{quote_identifier, quote_literal};
use crate::config::{GeneratorSettings, OrderMode};
use crate::core::{AttributeDefinition, Result};

/// Derived table collapsing one attribute's satellite rows to a single
/// delimited string per (entity id, language).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateQuery {
    pub attribute: AttributeDefinition,
    pub satellite_table: String,
    pub value_columns: Vec<String>,
}

impl AggregateQuery {
    pub fn new(attribute: AttributeDefinition, satellite_table: &str, value_columns: Vec<String>) -> Self {
        Self {
            attribute,
            satellite_table: satellite_table.to_string(),
            value_columns,
        }
    }

    /// Output column name
    pub fn column(&self) -> &str {
        &self.attribute.name
    }

    /// Join alias of the derived table
    pub fn alias(&self) -> String {
        format!("agg_{}", self.attribute.name)
    }

    /// `COALESCE(<value columns>)`
    fn value_expr(&self) -> Result<String> {
        let columns = self
            .value_columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("COALESCE({})", columns.join(", ")))
    }

    pub fn to_sql(&self, settings: &GeneratorSettings) -> Result<String> {
        let value = self.value_expr()?;
        let order = match settings.order_multi_values {
            OrderMode::Delta => format!(" ORDER BY {}", quote_identifier("delta")?),
            OrderMode::Value => format!(" ORDER BY {}", value),
            OrderMode::None => String::new(),
        };

        Ok(format!(
            "SELECT `entity_id`, `langcode`, GROUP_CONCAT({value}{order} SEPARATOR {separator}) AS {column} \
             FROM {table} \
             WHERE `deleted` = 0 \
             GROUP BY `entity_id`, `langcode`",
            separator = quote_literal(&settings.separator),
            column = quote_identifier(self.column())?,
            table = quote_identifier(&self.satellite_table)?,
        ))
    }
}
