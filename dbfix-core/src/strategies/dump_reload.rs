//! Dump-and-reload strategy.
//!
//! Every user table is recreated in a fresh sibling container and its rows
//! are streamed across with parameterized inserts, one transaction per table.
//! Indexes, views and triggers are replayed afterwards on a best-effort basis.
//! The fresh container replaces the working copy only when at least one table
//! was fully reloaded.

use super::{
    RELOAD_SUFFIX, RepairStrategy, StrategyKind, StrategyOutcome, remove_artifact, replace_file,
    sibling_path,
};
use crate::Result;
use crate::database::{Database, SqlValue, quote_identifier};
use crate::error::{DbFixError, error_chain};
use async_trait::async_trait;
use futures::TryStreamExt;
use std::path::Path;
use std::time::Duration;

/// Prefix of tables the engine creates and maintains itself.
const INTERNAL_TABLE_PREFIX: &str = "sqlite_";

/// Secondary schema objects, in replay order.
const SECONDARY_OBJECTS_QUERY: &str = "SELECT name, sql FROM sqlite_master \
     WHERE type IN ('index', 'view', 'trigger') AND sql IS NOT NULL \
     ORDER BY CASE type WHEN 'index' THEN 0 WHEN 'view' THEN 1 ELSE 2 END";

#[derive(Debug, Clone)]
pub struct DumpReloadRepair {
    connect_timeout: Duration,
}

impl DumpReloadRepair {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl RepairStrategy for DumpReloadRepair {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DumpReload
    }

    async fn attempt(&self, working_copy: &Path) -> Result<StrategyOutcome> {
        let source = match Database::open(working_copy, self.connect_timeout).await {
            Ok(db) => db,
            Err(e) => {
                tracing::error!("Dump-and-reload repair failed: {}", error_chain(&e));
                return Ok(StrategyOutcome::engine_failure(&e));
            }
        };

        let tables = match source.list_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                tracing::error!("Dump-and-reload repair failed: {}", error_chain(&e));
                source.close().await;
                return Ok(StrategyOutcome::engine_failure(&e));
            }
        };

        if tables.is_empty() {
            tracing::warn!("No tables found in database");
            source.close().await;
            let mut outcome = StrategyOutcome::default();
            outcome.detail("error", "No tables found in database");
            return Ok(outcome);
        }

        let fresh_path = sibling_path(working_copy, RELOAD_SUFFIX);
        let target = match Database::create(&fresh_path, self.connect_timeout).await {
            Ok(db) => db,
            Err(e) => {
                tracing::error!("Could not create reload target: {}", error_chain(&e));
                source.close().await;
                return Ok(StrategyOutcome::engine_failure(&e));
            }
        };

        let mut dumped = Vec::new();
        let mut skipped = Vec::new();
        let mut reloaded = serde_json::Map::new();
        let mut failed = serde_json::Map::new();

        for table in &tables {
            if table.starts_with(INTERNAL_TABLE_PREFIX) {
                skipped.push(table.clone());
                continue;
            }

            let schema = match source.table_schema(table).await {
                Ok(Some(schema)) => schema,
                Ok(None) => {
                    tracing::warn!("Could not get schema for table {}", table);
                    failed.insert(table.clone(), "no schema recorded".into());
                    continue;
                }
                Err(e) => {
                    let message = error_chain(&e);
                    tracing::warn!("Could not get schema for table {}: {}", table, message);
                    failed.insert(table.clone(), message.into());
                    continue;
                }
            };

            if let Err(e) = target.execute(&schema).await {
                let message = error_chain(&e);
                tracing::warn!("Could not recreate table {}: {}", table, message);
                failed.insert(table.clone(), message.into());
                continue;
            }
            dumped.push(table.clone());

            match copy_rows(&source, &target, table).await {
                Ok(rows) => {
                    tracing::info!("Table {} dumped and reloaded ({} rows)", table, rows);
                    reloaded.insert(table.clone(), rows.into());
                }
                Err(e) => {
                    let message = error_chain(&e);
                    tracing::warn!("Could not reload data for table {}: {}", table, message);
                    failed.insert(table.clone(), message.into());
                }
            }
        }

        let recreated = if reloaded.is_empty() {
            Vec::new()
        } else {
            recreate_secondary_objects(&source, &target).await
        };

        source.close().await;
        target.close().await;

        let mut outcome = StrategyOutcome::default();
        outcome.detail("tables_dumped", dumped);
        outcome.detail("tables_skipped", skipped);
        outcome.detail("tables_failed", failed);
        outcome.detail("objects_recreated", recreated);

        if reloaded.is_empty() {
            tracing::warn!("No table could be reloaded");
            remove_artifact(&fresh_path).await;
        } else {
            replace_file(&fresh_path, working_copy).await?;
            tracing::info!("Working copy replaced with reloaded database");
            outcome.succeeded = true;
        }
        outcome.detail("tables_reloaded", reloaded);

        Ok(outcome)
    }
}

/// Streams every row of `table` from `source` into the same table in `target`.
///
/// Runs in a single transaction on the target; any failure rolls the table's
/// inserts back.
async fn copy_rows(source: &Database, target: &Database, table: &str) -> Result<u64> {
    let select = format!("SELECT * FROM {}", quote_identifier(table));
    let mut rows = sqlx::query(&select).fetch(source.pool());

    let mut tx = target.pool().begin().await.map_err(|e| {
        DbFixError::query_failed(format!("Could not start transaction for {}", table), e)
    })?;

    let mut insert: Option<String> = None;
    let mut copied = 0u64;

    while let Some(row) = rows.try_next().await.map_err(|e| {
        DbFixError::query_failed(format!("Could not read rows from table {}", table), e)
    })? {
        let values = SqlValue::row_values(&row);
        let sql = insert.get_or_insert_with(|| insert_statement(table, values.len()));

        let mut query = sqlx::query(sql.as_str());
        for value in values {
            query = value.bind(query);
        }
        query.execute(&mut *tx).await.map_err(|e| {
            DbFixError::query_failed(format!("Could not insert into table {}", table), e)
        })?;

        copied = copied.saturating_add(1);
    }

    tx.commit()
        .await
        .map_err(|e| DbFixError::query_failed(format!("Could not commit table {}", table), e))?;

    Ok(copied)
}

/// `INSERT INTO "<table>" VALUES (?, ?, ...)` with one placeholder per column.
fn insert_statement(table: &str, columns: usize) -> String {
    let placeholders = vec!["?"; columns].join(", ");
    format!(
        "INSERT INTO {} VALUES ({})",
        quote_identifier(table),
        placeholders
    )
}

/// Replays indexes, views and triggers; returns the names that were created.
async fn recreate_secondary_objects(source: &Database, target: &Database) -> Vec<String> {
    let objects: Vec<(String, String)> = match sqlx::query_as(SECONDARY_OBJECTS_QUERY)
        .fetch_all(source.pool())
        .await
    {
        Ok(objects) => objects,
        Err(e) => {
            tracing::warn!("Could not read indexes, views and triggers: {}", e);
            return Vec::new();
        }
    };

    let mut recreated = Vec::new();
    for (name, sql) in objects {
        match target.execute(&sql).await {
            Ok(_) => recreated.push(name),
            Err(e) => tracing::warn!("Could not recreate {}: {}", name, error_chain(&e)),
        }
    }
    recreated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_statement() {
        assert_eq!(
            insert_statement("items", 3),
            "INSERT INTO \"items\" VALUES (?, ?, ?)"
        );
        assert_eq!(
            insert_statement("a\"b", 1),
            "INSERT INTO \"a\"\"b\" VALUES (?)"
        );
    }
}
