//! MySQL session backed by one dedicated `sqlx` connection.
//!
//! Session state (transactions, `SET SESSION`, `GET_LOCK`) lives on the
//! server-side connection, so a pool would not do: every call goes through
//! the same connection behind a mutex.

use super::{Connection, ConnectionConfig, Driver};
use crate::core::{Result, ViewError};
use async_trait::async_trait;
use sqlx::Connection as _;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection as RawConnection};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const RESET_SQL_MODE: &str =
    "SET SESSION sql_mode = REPLACE(@@SESSION.sql_mode, 'NO_BACKSLASH_ESCAPES', '')";

/// `GET_LOCK` takes whole seconds; round up so a sub-second wait still waits.
fn lock_timeout_secs(timeout: Duration) -> i64 {
    i64::try_from(timeout.as_millis().div_ceil(1000)).unwrap_or(i64::MAX)
}

pub struct MySqlConnection {
    conn: Mutex<RawConnection>,
    database: String,
}

impl MySqlConnection {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        config.validate().map_err(ViewError::Config)?;

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database);

        let conn = tokio::time::timeout(config.connect_timeout, RawConnection::connect_with(&options))
            .await
            .map_err(|_| {
                ViewError::Database(format!("Timed out connecting to {}", config.to_url()))
            })??;

        let connection = Self {
            conn: Mutex::new(conn),
            database: config.database.clone(),
        };
        // Generated literals escape backslashes, which only holds without
        // NO_BACKSLASH_ESCAPES.
        connection.execute(RESET_SQL_MODE).await?;

        debug!(url = %config.to_url(), "connected");
        Ok(connection)
    }

    pub async fn connect_url(url: &str) -> Result<Self> {
        let config = ConnectionConfig::from_url(url).map_err(ViewError::Config)?;
        Self::connect(&config).await
    }

    pub async fn close(self) -> Result<()> {
        self.conn.into_inner().close().await?;
        Ok(())
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    fn driver(&self) -> Driver {
        Driver::MySql
    }

    fn database_name(&self) -> &str {
        &self.database
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        debug!(%sql, "execute");
        let mut conn = self.conn.lock().await;
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(sql)).await?;
        Ok(())
    }

    async fn fetch_strings(&self, sql: &str, params: &[&str]) -> Result<Vec<String>> {
        debug!(%sql, ?params, "fetch");
        let mut conn = self.conn.lock().await;

        // INFORMATION_SCHEMA columns may come back with a binary collation,
        // so decode bytes rather than VARCHAR.
        let mut query = sqlx::query_scalar::<_, Vec<u8>>(sql);
        for param in params {
            query = query.bind(*param);
        }
        let rows = query.fetch_all(&mut *conn).await?;

        rows.into_iter()
            .map(|bytes| {
                String::from_utf8(bytes).map_err(|e| ViewError::Database(e.to_string()))
            })
            .collect()
    }

    async fn begin(&self) -> Result<()> {
        self.execute("START TRANSACTION").await
    }

    async fn commit(&self) -> Result<()> {
        self.execute("COMMIT").await
    }

    async fn rollback(&self) -> Result<()> {
        self.execute("ROLLBACK").await
    }

    async fn try_advisory_lock(&self, name: &str, timeout: Duration) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let acquired: Option<i64> = sqlx::query_scalar("SELECT GET_LOCK(?, ?)")
            .bind(name)
            .bind(lock_timeout_secs(timeout))
            .fetch_one(&mut *conn)
            .await?;
        Ok(acquired == Some(1))
    }

    async fn release_advisory_lock(&self, name: &str) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let _: Option<i64> = sqlx::query_scalar("SELECT RELEASE_LOCK(?)")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;
        Ok(())
    }
}
