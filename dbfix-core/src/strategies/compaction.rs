//! VACUUM strategy.
//!
//! Rebuilds the container from its logical contents. A failed consistency
//! probe beforehand is noted but does not stop the rebuild.

use super::{RepairStrategy, StrategyKind, StrategyOutcome};
use crate::Result;
use crate::database::Database;
use crate::error::error_chain;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CompactionRepair {
    connect_timeout: Duration,
}

impl CompactionRepair {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl RepairStrategy for CompactionRepair {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Compaction
    }

    async fn attempt(&self, working_copy: &Path) -> Result<StrategyOutcome> {
        let db = match Database::open(working_copy, self.connect_timeout).await {
            Ok(db) => db,
            Err(e) => {
                tracing::error!("Compaction repair failed: {}", error_chain(&e));
                return Ok(StrategyOutcome::engine_failure(&e));
            }
        };

        let mut outcome = StrategyOutcome::default();

        match db.consistency_probe().await {
            Ok(verdict) => {
                tracing::info!("Integrity check before VACUUM: {}", verdict);
                outcome.detail("integrity_check", verdict);
            }
            Err(e) => {
                let message = error_chain(&e);
                tracing::warn!("Integrity check failed before VACUUM: {}", message);
                outcome.detail("integrity_check_error", message);
            }
        }

        tracing::info!("Executing VACUUM");
        match db.execute("VACUUM").await {
            Ok(_) => {
                tracing::info!("VACUUM completed successfully");
                outcome.succeeded = true;
            }
            Err(e) => {
                let message = error_chain(&e);
                tracing::warn!("VACUUM failed: {}", message);
                outcome.detail("vacuum_error", message);
            }
        }

        db.close().await;
        Ok(outcome)
    }
}
