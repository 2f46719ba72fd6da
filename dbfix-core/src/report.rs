//! Session reports.
//!
//! The structured report is the serialized [`RepairSession`]. The HTML report
//! is rendered from a [`ReportDocument`], a flattened view of the session
//! holding display-ready strings only.

use crate::Result;
use crate::error::DbFixError;
use crate::models::{RepairAttempt, RepairSession, ValidationReport};
use askama::Template;
use chrono::Local;
use std::path::Path;

/// Display timestamp format.
const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// View model for the HTML report.
#[derive(Debug, Template)]
#[template(path = "repair_report.html")]
pub struct ReportDocument {
    pub title: String,
    pub session_id: String,
    pub succeeded: bool,
    pub original_path: String,
    pub backup_path: String,
    pub best_path: String,
    pub size_bytes: u64,
    pub sqlite_version: String,
    pub platform: String,
    pub message_mode: bool,
    pub started_at: String,
    pub finished_at: String,
    pub attempts: Vec<AttemptRow>,
    pub original: StructureView,
    pub repaired: Option<StructureView>,
    pub extracted_messages: Option<String>,
    pub generated_at: String,
}

#[derive(Debug, Clone)]
pub struct AttemptRow {
    pub name: String,
    pub succeeded: bool,
    pub duration: String,
    pub summary: String,
}

#[derive(Debug, Clone)]
pub struct StructureView {
    pub valid_container: bool,
    pub verdict: String,
    pub tables: Vec<TableRow>,
    pub total_rows: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TableRow {
    pub name: String,
    pub rows: String,
}

impl ReportDocument {
    /// Builds the view model for a session.
    pub fn from_session(session: &RepairSession) -> Self {
        let info = &session.database_info;
        let title = session
            .original_path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());

        Self {
            title,
            session_id: session.session_id.to_string(),
            succeeded: session.succeeded,
            original_path: session.original_path.display().to_string(),
            backup_path: session.backup_path.display().to_string(),
            best_path: session
                .best_path
                .as_ref()
                .map_or_else(|| "None".to_string(), |p| p.display().to_string()),
            size_bytes: info.size_bytes,
            sqlite_version: info.sqlite_version.clone(),
            platform: info.platform.clone(),
            message_mode: info.is_message_database,
            started_at: session
                .started_at
                .with_timezone(&Local)
                .format(DISPLAY_TIME_FORMAT)
                .to_string(),
            finished_at: session.finished_at.map_or_else(
                || "-".to_string(),
                |t| t.with_timezone(&Local).format(DISPLAY_TIME_FORMAT).to_string(),
            ),
            attempts: session.attempts.iter().map(AttemptRow::from_attempt).collect(),
            original: StructureView::from_report(&session.original_report),
            repaired: session
                .succeeded
                .then_some(session.best_report.as_ref())
                .flatten()
                .map(StructureView::from_report),
            extracted_messages: session
                .extracted_messages_path
                .as_ref()
                .map(|p| p.display().to_string()),
            generated_at: Local::now().format(DISPLAY_TIME_FORMAT).to_string(),
        }
    }
}

impl AttemptRow {
    fn from_attempt(attempt: &RepairAttempt) -> Self {
        let summary = match &attempt.error_message {
            Some(message) => message.clone(),
            None => attempt
                .details
                .iter()
                .map(|(key, value)| format!("{}: {}", key, value))
                .collect::<Vec<_>>()
                .join("; "),
        };

        Self {
            name: attempt.strategy_name.clone(),
            succeeded: attempt.succeeded,
            duration: format!("{:.2}s", attempt.duration_seconds),
            summary,
        }
    }
}

impl StructureView {
    fn from_report(report: &ValidationReport) -> Self {
        let tables = report
            .tables
            .iter()
            .map(|name| TableRow {
                name: name.clone(),
                rows: report
                    .table_counts
                    .get(name)
                    .map_or_else(|| "unreadable".to_string(), u64::to_string),
            })
            .collect();

        Self {
            valid_container: report.is_valid_container,
            verdict: report
                .consistency_verdict
                .clone()
                .unwrap_or_else(|| "unavailable".to_string()),
            tables,
            total_rows: report.total_rows(),
            errors: report.errors.clone(),
        }
    }
}

/// Renders the HTML report for a session.
pub fn render_html(session: &RepairSession) -> Result<String> {
    ReportDocument::from_session(session)
        .render()
        .map_err(|e| DbFixError::Report {
            context: "Failed to render HTML report".to_string(),
            source: e,
        })
}

/// Serializes the session as pretty-printed JSON.
pub fn render_json(session: &RepairSession) -> Result<String> {
    serde_json::to_string_pretty(session).map_err(|e| DbFixError::Serialization {
        context: "Failed to serialize repair session".to_string(),
        source: e,
    })
}

/// Writes both reports.
pub async fn write_reports(session: &RepairSession, json_path: &Path, html_path: &Path) -> Result<()> {
    let html = render_html(session)?;
    let json = render_json(session)?;

    tokio::fs::write(json_path, json)
        .await
        .map_err(|e| DbFixError::io("Failed to write JSON report", json_path, e))?;
    tokio::fs::write(html_path, html)
        .await
        .map_err(|e| DbFixError::io("Failed to write HTML report", html_path, e))?;

    Ok(())
}
