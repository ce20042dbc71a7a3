use crate::connection::Connection;
use crate::core::Result;
use tracing::debug;

const TABLE_EXISTS_SQL: &str = "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND TABLE_TYPE = 'BASE TABLE'";

const LIST_COLUMNS_SQL: &str = "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION";

const LIST_VIEWS_SQL: &str = "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.VIEWS \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME LIKE ? ORDER BY TABLE_NAME";

/// Read-only catalog lookups scoped to the connection's active database.
pub struct SchemaIntrospector<'a> {
    connection: &'a dyn Connection,
}

impl<'a> SchemaIntrospector<'a> {
    pub fn new(connection: &'a dyn Connection) -> Self {
        Self { connection }
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let found = self
            .connection
            .fetch_strings(TABLE_EXISTS_SQL, &[self.connection.database_name(), table])
            .await?;
        Ok(!found.is_empty())
    }

    /// Column names in declaration order; empty when the table is absent.
    pub async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
        let columns = self
            .connection
            .fetch_strings(LIST_COLUMNS_SQL, &[self.connection.database_name(), table])
            .await?;
        debug!(table, columns = columns.len(), "introspected columns");
        Ok(columns)
    }

    /// View names matching a `LIKE` pattern, sorted.
    pub async fn list_views(&self, like_pattern: &str) -> Result<Vec<String>> {
        let mut views = self
            .connection
            .fetch_strings(LIST_VIEWS_SQL, &[self.connection.database_name(), like_pattern])
            .await?;
        // server collation may order differently
        views.sort();
        Ok(views)
    }
}
