//! Read-only probe strategy.
//!
//! Runs the engine's consistency and foreign-key probes against the working
//! copy. Opening and reading a container is sometimes enough for the engine
//! to roll back a hot journal, which is the only repair this performs.

use super::{RepairStrategy, StrategyKind, StrategyOutcome};
use crate::Result;
use crate::database::Database;
use crate::error::error_chain;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Probes executed in order.
pub const PROBES: [&str; 3] = [
    "PRAGMA integrity_check",
    "PRAGMA quick_check",
    "PRAGMA foreign_key_check",
];

#[derive(Debug, Clone)]
pub struct BasicProbeRepair {
    connect_timeout: Duration,
}

impl BasicProbeRepair {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl RepairStrategy for BasicProbeRepair {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BasicProbe
    }

    async fn attempt(&self, working_copy: &Path) -> Result<StrategyOutcome> {
        let db = match Database::open(working_copy, self.connect_timeout).await {
            Ok(db) => db,
            Err(e) => {
                tracing::error!("Basic probe repair failed: {}", error_chain(&e));
                return Ok(StrategyOutcome::engine_failure(&e));
            }
        };

        let mut attempted = Vec::new();
        let mut succeeded = Vec::new();
        let mut results = serde_json::Map::new();

        for probe in PROBES {
            attempted.push(probe);
            tracing::info!("Executing {}", probe);

            match db.first_value(probe).await {
                Ok(value) => {
                    let rendered = value.map_or_else(|| "no rows".to_string(), |v| v.to_string());
                    tracing::info!("{} result: {}", probe, rendered);
                    results.insert(probe.to_string(), rendered.into());
                    succeeded.push(probe);
                }
                Err(e) => tracing::warn!("{} failed: {}", probe, error_chain(&e)),
            }
        }

        db.close().await;

        let mut outcome = StrategyOutcome {
            succeeded: !succeeded.is_empty(),
            ..StrategyOutcome::default()
        };
        outcome.detail("probes_attempted", attempted);
        outcome.detail("probes_succeeded", succeeded);
        outcome.detail("probe_results", results);
        Ok(outcome)
    }
}
