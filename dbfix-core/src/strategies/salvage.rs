//! Salvage strategy.
//!
//! Moves no data. Each table is checked for a schema entry and counted, which
//! tells the report which tables are still readable and how many rows they
//! hold. In message mode a readable `message` table is also exported.

use super::messages::{self, MESSAGE_TABLE};
use super::{RepairStrategy, StrategyKind, StrategyOutcome};
use crate::Result;
use crate::database::Database;
use crate::error::error_chain;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SalvageRepair {
    connect_timeout: Duration,
    message_mode: bool,
    messages_path: PathBuf,
}

impl SalvageRepair {
    pub fn new(connect_timeout: Duration, message_mode: bool, messages_path: PathBuf) -> Self {
        Self {
            connect_timeout,
            message_mode,
            messages_path,
        }
    }
}

#[async_trait]
impl RepairStrategy for SalvageRepair {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Salvage
    }

    async fn attempt(&self, working_copy: &Path) -> Result<StrategyOutcome> {
        let db = match Database::open(working_copy, self.connect_timeout).await {
            Ok(db) => db,
            Err(e) => {
                tracing::error!("Salvage repair failed: {}", error_chain(&e));
                return Ok(StrategyOutcome::engine_failure(&e));
            }
        };

        let tables = match db.list_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                tracing::error!("Salvage repair failed: {}", error_chain(&e));
                db.close().await;
                return Ok(StrategyOutcome::engine_failure(&e));
            }
        };

        let mut outcome = StrategyOutcome::default();
        outcome.detail("tables_found", tables.clone());

        if tables.is_empty() {
            tracing::warn!("No tables found in database");
            db.close().await;
            return Ok(outcome);
        }

        let mut salvaged = Vec::new();
        let mut rows = serde_json::Map::new();

        for table in &tables {
            match db.table_schema(table).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::warn!("Could not get schema for table {}", table);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Could not get schema for table {}: {}", table, error_chain(&e));
                    continue;
                }
            }

            match db.count_rows(table).await {
                Ok(count) => {
                    tracing::info!("Table {} has {} rows", table, count);
                    if count > 0 {
                        salvaged.push(table.clone());
                        rows.insert(table.clone(), count.into());
                    }
                }
                Err(e) => tracing::warn!("Could not count rows in table {}: {}", table, error_chain(&e)),
            }
        }

        if !salvaged.is_empty() {
            tracing::info!("Database partially salvaged: {} tables readable", salvaged.len());
            outcome.succeeded = true;

            if self.message_mode && salvaged.iter().any(|t| t == MESSAGE_TABLE) {
                match messages::extract_messages(&db, &self.messages_path).await {
                    Ok(count) => {
                        outcome.detail(
                            "extracted_messages",
                            serde_json::json!({
                                "count": count,
                                "path": self.messages_path.display().to_string(),
                            }),
                        );
                        outcome.extracted_messages = Some(self.messages_path.clone());
                    }
                    Err(e) => tracing::warn!("Could not extract messages: {}", error_chain(&e)),
                }
            }
        }

        db.close().await;

        outcome.detail("tables_salvaged", salvaged);
        outcome.detail("rows_salvaged", rows);
        Ok(outcome)
    }
}
