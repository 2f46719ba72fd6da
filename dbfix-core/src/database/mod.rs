//! Database handle abstraction over the SQLite engine.
//!
//! # Module Structure
//! - `connection`: Header check and open modes
//! - `values`: Dynamically typed values for row copies and JSON export
//!
//! All statements go through the engine's normal query surface. Nothing here
//! reads or patches the on-disk page layout.

pub mod connection;
pub mod values;

use crate::Result;
use crate::error::DbFixError;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteRow;
use std::path::PathBuf;

pub use connection::{OpenMode, SQLITE_HEADER, has_valid_header, read_header};
pub use values::{SqlValue, row_to_json};

/// The engine's built-in full consistency probe.
pub const CONSISTENCY_PROBE: &str = "PRAGMA integrity_check";

/// The only passing consistency verdict.
pub const PASSING_VERDICT: &str = "ok";

/// An open SQLite container.
///
/// Backed by a single-connection pool; dropping the handle without calling
/// [`Database::close`] leaves the connection to be closed in the background,
/// so callers that copy or rename the file afterwards must close explicitly.
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Underlying pool, for streaming queries and transactions.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Executes a statement, returning the number of affected rows.
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map(|done| done.rows_affected())
            .map_err(|e| DbFixError::query_failed(format!("Failed to execute: {}", sql), e))
    }

    /// Runs a query and returns every row.
    pub async fn query_all(&self, sql: &str) -> Result<Vec<SqliteRow>> {
        sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DbFixError::query_failed(format!("Failed to query: {}", sql), e))
    }

    /// Runs a query and returns the first column of its first row, if any.
    pub async fn first_value(&self, sql: &str) -> Result<Option<SqlValue>> {
        let row = sqlx::query(sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DbFixError::query_failed(format!("Failed to query: {}", sql), e))?;

        Ok(row.map(|row| SqlValue::from_row(&row, 0)))
    }

    /// Names of all schema objects of kind "table", in engine order.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DbFixError::query_failed("Could not list tables", e))
    }

    /// The CREATE statement recorded for a table.
    ///
    /// The name is bound as a parameter, so any characters are safe.
    pub async fn table_schema(&self, table: &str) -> Result<Option<String>> {
        let sql: Option<Option<String>> =
            sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    DbFixError::query_failed(
                        format!("Could not read schema for table {}", table),
                        e,
                    )
                })?;

        Ok(sql.flatten())
    }

    /// Number of rows in a table.
    pub async fn count_rows(&self, table: &str) -> Result<u64> {
        let query = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        let count: i64 = sqlx::query_scalar(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                DbFixError::query_failed(format!("Could not count rows in table {}", table), e)
            })?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Runs the consistency probe and returns its first result row.
    pub async fn consistency_probe(&self) -> Result<String> {
        match self.first_value(CONSISTENCY_PROBE).await {
            Ok(Some(value)) => Ok(value.to_string()),
            Ok(None) => Ok(String::new()),
            Err(DbFixError::Query { source, .. }) => Err(DbFixError::Query {
                context: "Integrity check failed".to_string(),
                source,
            }),
            Err(e) => Err(e),
        }
    }

    /// Closes the handle, waiting for the connection to shut down.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Quotes an identifier for SQLite, doubling embedded double quotes.
///
/// # Example
/// ```rust
/// use dbfix_core::database::quote_identifier;
///
/// assert_eq!(quote_identifier("users"), "\"users\"");
/// assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
/// ```
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Version string of the bundled SQLite engine.
pub async fn engine_version() -> Result<String> {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .map_err(|e| DbFixError::connection_failed("Failed to open in-memory database", e))?;

    let version = sqlx::query_scalar("SELECT sqlite_version()")
        .fetch_one(&pool)
        .await
        .map_err(|e| DbFixError::query_failed("Could not determine SQLite version", e));

    pool.close().await;
    version
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn fixture(dir: &Path) -> Database {
        let db = Database::create(&dir.join("fixture.db"), TIMEOUT)
            .await
            .unwrap();
        db.execute("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap();
        db.execute("CREATE TABLE \"odd\"\"name\" (value TEXT)")
            .await
            .unwrap();
        db.execute("INSERT INTO items (name) VALUES ('a'), ('b'), ('c')")
            .await
            .unwrap();
        db
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("plain"), "\"plain\"");
        assert_eq!(quote_identifier("with space"), "\"with space\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[tokio::test]
    async fn test_list_tables_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let db = fixture(dir.path()).await;

        let tables = db.list_tables().await.unwrap();
        assert_eq!(tables, vec!["items".to_string(), "odd\"name".to_string()]);
        assert_eq!(db.count_rows("items").await.unwrap(), 3);
        assert_eq!(db.count_rows("odd\"name").await.unwrap(), 0);

        db.close().await;
    }

    #[tokio::test]
    async fn test_table_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db = fixture(dir.path()).await;

        let schema = db.table_schema("items").await.unwrap().unwrap();
        assert!(schema.starts_with("CREATE TABLE items"));
        assert!(db.table_schema("odd\"name").await.unwrap().is_some());
        assert!(db.table_schema("missing").await.unwrap().is_none());

        db.close().await;
    }

    #[tokio::test]
    async fn test_missing_table_is_query_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = fixture(dir.path()).await;

        let result = db.count_rows("missing").await;
        assert!(matches!(result, Err(DbFixError::Query { .. })));

        let result = db.execute("NOT EVEN SQL").await;
        assert!(matches!(result, Err(DbFixError::Query { .. })));

        db.close().await;
    }

    #[tokio::test]
    async fn test_consistency_probe_on_sound_container() {
        let dir = tempfile::tempdir().unwrap();
        let db = fixture(dir.path()).await;
        assert_eq!(db.consistency_probe().await.unwrap(), PASSING_VERDICT);
        db.close().await;
    }

    #[tokio::test]
    async fn test_engine_version() {
        let version = engine_version().await.unwrap();
        assert!(version.starts_with('3'));
    }
}
