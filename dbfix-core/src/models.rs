//! Data models for validation reports, repair attempts and sessions.
//!
//! Everything here is serializable; the JSON session report is simply the
//! serialized [`RepairSession`].

use crate::database::PASSING_VERDICT;
use crate::strategies::StrategyKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Structural and consistency findings for one database file.
///
/// `table_counts` only holds tables whose count query succeeded, so its keys
/// are always a subset of `tables`. When `is_valid_container` is false every
/// other field is empty apart from `errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid_container: bool,
    pub consistency_verdict: Option<String>,
    pub tables: Vec<String>,
    pub table_counts: BTreeMap<String, u64>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// True iff the consistency probe returned exactly "ok".
    pub fn passes_consistency(&self) -> bool {
        self.consistency_verdict.as_deref() == Some(PASSING_VERDICT)
    }

    /// Number of tables whose rows could be counted.
    pub fn countable_tables(&self) -> usize {
        self.table_counts.len()
    }

    /// Sum of all counted rows.
    pub fn total_rows(&self) -> u64 {
        self.table_counts
            .values()
            .fold(0u64, |total, count| total.saturating_add(*count))
    }

    /// Records a diagnostic.
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}

/// Environment and input facts captured when a session starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub original_path: PathBuf,
    pub size_bytes: u64,
    pub sqlite_version: String,
    pub platform: String,
    pub is_message_database: bool,
}

/// The record of one strategy invocation. Never modified once logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairAttempt {
    pub strategy: StrategyKind,
    pub strategy_name: String,
    pub succeeded: bool,
    /// Working copy holding the result; set only when the strategy succeeded
    pub result_path: Option<PathBuf>,
    pub duration_seconds: f64,
    pub details: serde_json::Map<String, serde_json::Value>,
    pub error_message: Option<String>,
}

impl RepairAttempt {
    /// An attempt that ended in an error before producing an outcome.
    pub fn failed(kind: StrategyKind, duration_seconds: f64, error: impl Into<String>) -> Self {
        Self {
            strategy: kind,
            strategy_name: kind.display_name().to_string(),
            succeeded: false,
            result_path: None,
            duration_seconds,
            details: serde_json::Map::new(),
            error_message: Some(error.into()),
        }
    }
}

/// Where a session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    Init,
    BackedUp,
    BaselineValidated,
    StrategyRunning,
    StrategyEvaluated,
    ReportGenerated,
    Done,
}

/// Aggregate root for one repair run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairSession {
    pub session_id: uuid::Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stage: SessionStage,
    pub database_info: DatabaseInfo,
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub best_path: Option<PathBuf>,
    pub original_report: ValidationReport,
    pub best_report: Option<ValidationReport>,
    pub attempts: Vec<RepairAttempt>,
    pub succeeded: bool,
    pub extracted_messages_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
}

impl RepairSession {
    /// Creates a session in the `Init` stage, before any backup exists.
    pub fn new(database_info: DatabaseInfo) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            stage: SessionStage::Init,
            original_path: database_info.original_path.clone(),
            database_info,
            backup_path: PathBuf::new(),
            best_path: None,
            original_report: ValidationReport::default(),
            best_report: None,
            attempts: Vec::new(),
            succeeded: false,
            extracted_messages_path: None,
            report_path: None,
        }
    }

    /// Records the backup of the input and moves to `BackedUp`.
    pub fn record_backup(&mut self, backup_path: PathBuf) {
        self.backup_path = backup_path;
        self.advance(SessionStage::BackedUp);
    }

    /// Records the baseline report of the input and moves to
    /// `BaselineValidated`.
    pub fn record_baseline(&mut self, report: ValidationReport) {
        self.original_report = report;
        self.advance(SessionStage::BaselineValidated);
    }

    /// Adopts a new best candidate.
    pub fn adopt(&mut self, path: &Path, report: ValidationReport) {
        self.best_path = Some(path.to_path_buf());
        self.best_report = Some(report);
        self.succeeded = true;
    }

    /// Appends an attempt to the log.
    pub fn record(&mut self, attempt: RepairAttempt) {
        self.attempts.push(attempt);
    }

    /// Moves to the next lifecycle stage.
    pub fn advance(&mut self, stage: SessionStage) {
        tracing::debug!("Session {} stage {:?} -> {:?}", self.session_id, self.stage, stage);
        self.stage = stage;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(verdict: Option<&str>, counts: &[(&str, u64)]) -> ValidationReport {
        ValidationReport {
            is_valid_container: true,
            consistency_verdict: verdict.map(str::to_string),
            tables: counts.iter().map(|(t, _)| t.to_string()).collect(),
            table_counts: counts.iter().map(|(t, c)| (t.to_string(), *c)).collect(),
            errors: Vec::new(),
        }
    }

    fn info() -> DatabaseInfo {
        DatabaseInfo {
            original_path: PathBuf::from("/data/chat.db"),
            size_bytes: 8192,
            sqlite_version: "3.46.0".to_string(),
            platform: "linux".to_string(),
            is_message_database: false,
        }
    }

    #[test]
    fn test_passes_consistency_requires_exact_ok() {
        assert!(report(Some("ok"), &[]).passes_consistency());
        assert!(!report(Some("OK"), &[]).passes_consistency());
        assert!(!report(Some("*** in database main ***"), &[]).passes_consistency());
        assert!(!report(None, &[]).passes_consistency());
    }

    #[test]
    fn test_total_rows() {
        let r = report(Some("ok"), &[("a", 3), ("b", 4)]);
        assert_eq!(r.total_rows(), 7);
        assert_eq!(r.countable_tables(), 2);

        let r = report(Some("ok"), &[("a", u64::MAX), ("b", 1)]);
        assert_eq!(r.total_rows(), u64::MAX);
    }

    fn session(original: ValidationReport) -> RepairSession {
        let mut session = RepairSession::new(info());
        session.record_backup(PathBuf::from("/data/backups/chat_backup.db"));
        session.record_baseline(original);
        session
    }

    #[test]
    fn test_session_lifecycle_stages() {
        let mut session = RepairSession::new(info());
        assert_eq!(session.stage, SessionStage::Init);

        session.record_backup(PathBuf::from("/data/backups/chat_backup.db"));
        assert_eq!(session.stage, SessionStage::BackedUp);
        assert_eq!(
            session.backup_path,
            PathBuf::from("/data/backups/chat_backup.db")
        );

        session.record_baseline(report(None, &[("message", 2)]));
        assert_eq!(session.stage, SessionStage::BaselineValidated);
        assert_eq!(session.original_report.table_counts["message"], 2);
    }

    #[test]
    fn test_session_adopt() {
        let mut session = session(report(None, &[]));
        assert!(!session.succeeded);
        assert_eq!(session.original_path, PathBuf::from("/data/chat.db"));

        session.adopt(Path::new("/data/chat_repaired.db"), report(Some("ok"), &[]));
        assert!(session.succeeded);
        assert_eq!(session.best_path, Some(PathBuf::from("/data/chat_repaired.db")));
    }

    #[test]
    fn test_session_serializes_to_json() {
        let mut session = session(report(Some("ok"), &[("message", 2)]));
        session.record(RepairAttempt::failed(
            StrategyKind::ExternalRecovery,
            0.5,
            "boom",
        ));

        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["stage"], "baseline_validated");
        assert_eq!(json["attempts"][0]["strategy"], "external_recovery");
        assert_eq!(json["attempts"][0]["error_message"], "boom");
        assert_eq!(json["original_report"]["table_counts"]["message"], 2);
    }
}
