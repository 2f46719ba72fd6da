//! Repair session orchestration.
//!
//! A session backs the input up, validates it, runs the strategies in order
//! on isolated copies of the input and keeps the best candidate:
//!
//! ```text
//! Init -> BackedUp -> BaselineValidated
//!      -> (StrategyRunning -> StrategyEvaluated)*
//!      -> ReportGenerated -> Done
//! ```
//!
//! The input file is only ever read. Every strategy works on its own copy of
//! the original, never on the output of a previous strategy, and candidates
//! are always compared against the original baseline.

use crate::Result;
use crate::comparator::compare;
use crate::config::RepairConfig;
use crate::database::engine_version;
use crate::error::{DbFixError, error_chain};
use crate::models::{DatabaseInfo, RepairAttempt, RepairSession, SessionStage, ValidationReport};
use crate::report;
use crate::strategies::{
    RepairStrategy, StrategyContext, StrategyKind, StrategyOutcome, remove_artifacts,
};
use crate::validation::validate;
use chrono::{Local, Utc};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, error, info, warn};

/// Timestamp format used in backup and candidate file names.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Runs repair sessions for one input database.
///
/// # Example
/// ```rust,no_run
/// use dbfix_core::{RepairConfig, RepairOrchestrator};
///
/// # async fn example() -> dbfix_core::Result<()> {
/// let config = RepairConfig::new("/data/chat.db").with_output_dir("/data/repair");
/// let session = RepairOrchestrator::new(config).await?.run().await?;
/// if let Some(best) = &session.best_path {
///     println!("Repaired database: {}", best.display());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RepairOrchestrator {
    config: RepairConfig,
    logger: Option<Dispatch>,
}

impl RepairOrchestrator {
    /// Validates the configuration and prepares the output directory.
    ///
    /// # Errors
    /// Returns a configuration error for invalid settings and an I/O error if
    /// the output directory cannot be created.
    pub async fn new(config: RepairConfig) -> Result<Self> {
        config.validate()?;

        let output_dir = config.output_dir();
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| DbFixError::io("Failed to create output directory", &output_dir, e))?;

        Ok(Self {
            config,
            logger: None,
        })
    }

    /// Routes every event of the session to `logger`.
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Runs a complete repair session.
    ///
    /// # Errors
    /// Fails only when the backup cannot be created, in which case no
    /// strategy runs and no report is written. Strategy failures are recorded
    /// as failed attempts in the returned session.
    pub async fn run(&self) -> Result<RepairSession> {
        match &self.logger {
            Some(logger) => self.run_session().with_subscriber(logger.clone()).await,
            None => self.run_session().await,
        }
    }

    async fn run_session(&self) -> Result<RepairSession> {
        let input = self.config.input_path.as_path();
        info!("Starting repair of {}", input.display());

        let mut session = RepairSession::new(self.database_info().await);

        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let backup_path = self.create_backup(&timestamp).await.map_err(|e| {
            error!("Backup failed, aborting repair: {}", error_chain(&e));
            e
        })?;
        session.record_backup(backup_path);

        let original_report = validate(input, self.config.connect_timeout).await;
        log_report("Original database", &original_report);
        session.record_baseline(original_report);

        if session.original_report.passes_consistency() {
            info!("Database integrity check passed, no repair needed");
            let report = session.original_report.clone();
            session.adopt(input, report);
        } else {
            self.run_strategies(&mut session, &timestamp).await;
        }

        session.finished_at = Some(Utc::now());
        self.write_reports(&mut session).await;
        session.advance(SessionStage::Done);

        match &session.best_path {
            Some(best) if session.succeeded => info!("Repair succeeded: {}", best.display()),
            _ => warn!("Repair failed: no strategy improved the database"),
        }

        Ok(session)
    }

    /// Copies the input into the backup directory without overwriting an
    /// earlier backup.
    async fn create_backup(&self, timestamp: &str) -> Result<PathBuf> {
        let input = &self.config.input_path;
        tokio::fs::metadata(input)
            .await
            .map_err(|e| DbFixError::io("Input database not found", input, e))?;

        let backup_dir = self.config.backup_dir();
        tokio::fs::create_dir_all(&backup_dir)
            .await
            .map_err(|e| DbFixError::io("Failed to create backup directory", &backup_dir, e))?;

        let mut backup_path = self.config.backup_path(timestamp);
        let mut suffix = 1u32;
        while tokio::fs::try_exists(&backup_path).await.unwrap_or(false) {
            backup_path = self
                .config
                .backup_path(&format!("{}_{}", timestamp, suffix));
            suffix = suffix.saturating_add(1);
        }

        tokio::fs::copy(input, &backup_path)
            .await
            .map_err(|e| DbFixError::io("Failed to create backup", &backup_path, e))?;

        info!("Backup created: {}", backup_path.display());
        Ok(backup_path)
    }

    async fn database_info(&self) -> DatabaseInfo {
        let input = &self.config.input_path;
        let size_bytes = tokio::fs::metadata(input)
            .await
            .map(|m| m.len())
            .unwrap_or_default();

        let sqlite_version = engine_version().await.unwrap_or_else(|e| {
            warn!("Could not determine SQLite version: {}", error_chain(&e));
            "unknown".to_string()
        });

        DatabaseInfo {
            original_path: input.clone(),
            size_bytes,
            sqlite_version,
            platform: std::env::consts::OS.to_string(),
            is_message_database: self.config.message_mode,
        }
    }

    async fn run_strategies(&self, session: &mut RepairSession, timestamp: &str) {
        let context = StrategyContext::from_config(&self.config);

        for kind in StrategyKind::ALL {
            session.advance(SessionStage::StrategyRunning);
            let strategy = kind.instantiate(&context);
            let candidate = self.config.candidate_path(timestamp, kind);
            let stop = self
                .run_strategy(session, strategy.as_ref(), &candidate)
                .await;
            session.advance(SessionStage::StrategyEvaluated);

            if stop {
                info!("Database integrity restored, skipping remaining strategies");
                break;
            }
        }
    }

    /// Runs and evaluates one strategy on `candidate`. Returns true when the
    /// loop should stop.
    async fn run_strategy(
        &self,
        session: &mut RepairSession,
        strategy: &dyn RepairStrategy,
        candidate: &Path,
    ) -> bool {
        let kind = strategy.kind();
        info!("Attempting {}", kind);

        let started = Instant::now();
        let result = self.attempt(strategy, candidate).await;
        let duration_seconds = started.elapsed().as_secs_f64();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = error_chain(&e);
                error!("{} failed: {}", kind, message);
                session.record(RepairAttempt::failed(kind, duration_seconds, message));
                return false;
            }
        };

        if let Some(path) = &outcome.extracted_messages {
            session.extracted_messages_path = Some(path.clone());
        }

        let succeeded = outcome.succeeded;
        session.record(RepairAttempt {
            strategy: kind,
            strategy_name: kind.display_name().to_string(),
            succeeded,
            result_path: succeeded.then(|| candidate.to_path_buf()),
            duration_seconds,
            details: outcome.details,
            error_message: None,
        });

        if !succeeded {
            info!("{} did not succeed ({:.2}s)", kind, duration_seconds);
            return false;
        }

        let report = validate(candidate, self.config.connect_timeout).await;
        log_report(kind.display_name(), &report);

        match compare(&session.original_report, &report) {
            Some(improvement) => {
                info!("{} improved the database: {}", kind, improvement);
                let restored = report.passes_consistency();
                session.adopt(candidate, report);
                restored
            }
            None => {
                info!("{} did not improve the database", kind);
                false
            }
        }
    }

    /// Copies the original into `candidate` and runs `strategy` on it.
    async fn attempt(
        &self,
        strategy: &dyn RepairStrategy,
        candidate: &Path,
    ) -> Result<StrategyOutcome> {
        tokio::fs::copy(&self.config.input_path, candidate)
            .await
            .map_err(|e| DbFixError::io("Failed to create working copy", candidate, e))?;

        let Some(timeout) = self.config.strategy_timeout else {
            return strategy.attempt(candidate).await;
        };

        match tokio::time::timeout(timeout, strategy.attempt(candidate)).await {
            Ok(result) => result,
            Err(_) => {
                remove_artifacts(candidate).await;
                Err(DbFixError::StrategyTimeout {
                    strategy: strategy.kind().display_name().to_string(),
                    timeout,
                })
            }
        }
    }

    async fn write_reports(&self, session: &mut RepairSession) {
        let json_path = self.config.report_json_path();
        let html_path = self.config.report_html_path();

        session.advance(SessionStage::ReportGenerated);
        session.report_path = Some(html_path.clone());

        match report::write_reports(session, &json_path, &html_path).await {
            Ok(()) => info!("Repair report written to {}", html_path.display()),
            Err(e) => {
                error!("Could not write repair report: {}", error_chain(&e));
                session.report_path = None;
            }
        }
    }
}

fn log_report(label: &str, report: &ValidationReport) {
    info!(
        "{}: valid container: {}, integrity: {}, tables: {}, rows: {}",
        label,
        report.is_valid_container,
        report.consistency_verdict.as_deref().unwrap_or("unavailable"),
        report.countable_tables(),
        report.total_rows()
    );
    for e in &report.errors {
        warn!("{}: {}", label, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::{RECOVER_SCRIPT_SUFFIX, RELOAD_SUFFIX, sibling_path};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Leaves partial artifacts next to its working copy and never finishes.
    #[derive(Debug)]
    struct StalledRepair;

    #[async_trait]
    impl RepairStrategy for StalledRepair {
        fn kind(&self) -> StrategyKind {
            StrategyKind::DumpReload
        }

        async fn attempt(&self, working_copy: &Path) -> Result<StrategyOutcome> {
            for suffix in [RELOAD_SUFFIX, RECOVER_SCRIPT_SUFFIX] {
                let artifact = sibling_path(working_copy, suffix);
                tokio::fs::write(&artifact, b"partial")
                    .await
                    .map_err(|e| DbFixError::io("Failed to write artifact", &artifact, e))?;
            }
            std::future::pending::<Result<StrategyOutcome>>().await
        }
    }

    /// Fails outright instead of returning an outcome.
    #[derive(Debug)]
    struct BrokenRepair;

    #[async_trait]
    impl RepairStrategy for BrokenRepair {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Compaction
        }

        async fn attempt(&self, working_copy: &Path) -> Result<StrategyOutcome> {
            Err(DbFixError::io(
                "Failed to replace working copy",
                working_copy,
                std::io::Error::other("device full"),
            ))
        }
    }

    async fn fixture(dir: &Path, timeout: Option<Duration>) -> (RepairOrchestrator, RepairSession) {
        let input = dir.join("input.db");
        std::fs::write(&input, b"not a database").unwrap();

        let mut config = RepairConfig::new(&input).with_output_dir(dir.join("out"));
        if let Some(timeout) = timeout {
            config = config.with_strategy_timeout(timeout);
        }
        let orchestrator = RepairOrchestrator::new(config).await.unwrap();

        let mut session = RepairSession::new(DatabaseInfo {
            original_path: input,
            size_bytes: 14,
            sqlite_version: "3.46.0".to_string(),
            platform: "linux".to_string(),
            is_message_database: false,
        });
        session.record_backup(dir.join("backup.db"));
        session.record_baseline(ValidationReport::default());
        (orchestrator, session)
    }

    #[tokio::test]
    async fn test_timed_out_strategy_is_a_failed_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, mut session) =
            fixture(dir.path(), Some(Duration::from_millis(200))).await;
        let candidate = dir.path().join("out").join("input_repaired_dump_reload.db");

        let stop = orchestrator
            .run_strategy(&mut session, &StalledRepair, &candidate)
            .await;

        assert!(!stop);
        assert!(!session.succeeded);
        let attempt = &session.attempts[0];
        assert_eq!(attempt.strategy, StrategyKind::DumpReload);
        assert!(!attempt.succeeded);
        assert!(attempt.result_path.is_none());
        assert!(
            attempt
                .error_message
                .as_deref()
                .unwrap()
                .contains("timed out")
        );

        assert!(!sibling_path(&candidate, RELOAD_SUFFIX).exists());
        assert!(!sibling_path(&candidate, RECOVER_SCRIPT_SUFFIX).exists());
    }

    #[tokio::test]
    async fn test_strategy_error_is_a_failed_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, mut session) = fixture(dir.path(), None).await;
        let candidate = dir.path().join("out").join("input_repaired_compaction.db");

        let stop = orchestrator
            .run_strategy(&mut session, &BrokenRepair, &candidate)
            .await;

        assert!(!stop);
        assert_eq!(session.attempts.len(), 1);
        let attempt = &session.attempts[0];
        assert_eq!(attempt.strategy, StrategyKind::Compaction);
        assert!(!attempt.succeeded);
        assert!(attempt.details.is_empty());
        assert!(
            attempt
                .error_message
                .as_deref()
                .unwrap()
                .contains("device full")
        );
    }
}
