//! Structural and consistency validation of database files.
//!
//! [`validate`] never fails: every problem it meets is recorded in the
//! returned [`ValidationReport`]. Steps after the header check are
//! independent, so one failing probe never hides the results of the next.

use crate::database::{Database, has_valid_header};
use crate::error::error_chain;
use crate::models::ValidationReport;
use std::path::Path;
use std::time::Duration;

/// Default time allowed for the engine to open a container during validation.
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Validates a database file.
///
/// 1. Missing file: single error, not a valid container.
/// 2. Header mismatch (including files shorter than 16 bytes): error, stop.
/// 3. Open read-only; on failure record the error and stop.
/// 4. Consistency probe; its first row becomes the verdict.
/// 5. Enumerate tables.
/// 6. Count rows per table; failed counts are omitted, never zeroed.
pub async fn validate(path: &Path, connect_timeout: Duration) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        report.add_error(format!("File not found: {}", path.display()));
        return report;
    }

    match has_valid_header(path).await {
        Ok(valid) => {
            report.is_valid_container = valid;
            if !valid {
                report.add_error("Not a valid SQLite database (header check failed)");
            }
        }
        Err(e) => report.add_error(format!("Error checking SQLite header: {}", error_chain(&e))),
    }

    if !report.is_valid_container {
        tracing::debug!("{} failed the header check", path.display());
        return report;
    }

    let db = match Database::open_read_only(path, connect_timeout).await {
        Ok(db) => db,
        Err(e) => {
            report.add_error(format!("Could not connect to database: {}", error_chain(&e)));
            return report;
        }
    };

    match db.consistency_probe().await {
        Ok(verdict) => {
            tracing::debug!("Integrity check for {}: {}", path.display(), verdict);
            report.consistency_verdict = Some(verdict);
        }
        Err(e) => report.add_error(error_chain(&e)),
    }

    match db.list_tables().await {
        Ok(tables) => report.tables = tables,
        Err(e) => report.add_error(error_chain(&e)),
    }

    for table in report.tables.clone() {
        match db.count_rows(&table).await {
            Ok(count) => {
                report.table_counts.insert(table, count);
            }
            Err(e) => report.add_error(error_chain(&e)),
        }
    }

    db.close().await;
    report
}
