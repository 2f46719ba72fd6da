//! Repair session configuration.
//!
//! `RepairConfig` is also the single source of truth for every path a
//! session produces (backup, candidates, reports, log, extracted messages).

use crate::strategies::StrategyKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default external recovery utility.
pub const DEFAULT_RECOVERY_TOOL: &str = "sqlite3";

/// File name of the message extraction sink.
pub const EXTRACTED_MESSAGES_FILE: &str = "extracted_messages.json";

/// Configuration for a single repair session.
///
/// # Example
/// ```rust
/// use dbfix_core::RepairConfig;
/// use std::time::Duration;
///
/// let config = RepairConfig::new("/data/chat.db")
///     .with_output_dir("/tmp/repair")
///     .with_message_mode(true)
///     .with_strategy_timeout(Duration::from_secs(300));
///
/// assert!(config.validate().is_ok());
/// assert!(config.report_json_path().ends_with("repair_report_chat.json"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Database file to repair (absolute)
    pub input_path: PathBuf,
    /// Where backups, candidates and reports go; defaults to the input's directory
    pub output_dir: Option<PathBuf>,
    /// Treat the input as a message database and extract messages on salvage
    pub message_mode: bool,
    /// Program used by the external recovery strategy
    pub recovery_tool: String,
    /// Optional wall-clock limit per strategy invocation
    pub strategy_timeout: Option<Duration>,
    /// How long to wait for the engine to open a container
    pub connect_timeout: Duration,
}

impl RepairConfig {
    /// Creates a configuration for `input_path` with default settings.
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        let input_path = input_path.into();
        let input_path = std::path::absolute(&input_path).unwrap_or(input_path);
        Self {
            input_path,
            output_dir: None,
            message_mode: false,
            recovery_tool: DEFAULT_RECOVERY_TOOL.to_string(),
            strategy_timeout: None,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Builder method to set the output directory.
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        self.output_dir = Some(std::path::absolute(&output_dir).unwrap_or(output_dir));
        self
    }

    /// Builder method to toggle message-database mode.
    pub fn with_message_mode(mut self, message_mode: bool) -> Self {
        self.message_mode = message_mode;
        self
    }

    /// Builder method to set the external recovery utility.
    pub fn with_recovery_tool(mut self, tool: impl Into<String>) -> Self {
        self.recovery_tool = tool.into();
        self
    }

    /// Builder method to wrap each strategy in a timeout.
    pub fn with_strategy_timeout(mut self, timeout: Duration) -> Self {
        self.strategy_timeout = Some(timeout);
        self
    }

    /// Builder method to set the engine connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Validates configuration values.
    ///
    /// The input file is deliberately not required to exist here: a missing
    /// input aborts the session at the backup stage.
    ///
    /// # Errors
    /// Returns a configuration error for empty paths or zero timeouts
    pub fn validate(&self) -> crate::Result<()> {
        if self.input_path.as_os_str().is_empty() || self.input_path.file_name().is_none() {
            return Err(crate::error::DbFixError::configuration(
                "input path must name a database file",
            ));
        }

        if self.recovery_tool.trim().is_empty() {
            return Err(crate::error::DbFixError::configuration(
                "recovery tool cannot be empty",
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(crate::error::DbFixError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if let Some(timeout) = self.strategy_timeout
            && timeout.is_zero()
        {
            return Err(crate::error::DbFixError::configuration(
                "strategy_timeout must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Directory receiving every session output.
    pub fn output_dir(&self) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => self
                .input_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
        }
    }

    /// Input file name without its extension.
    pub fn file_stem(&self) -> String {
        self.input_path
            .file_stem()
            .map_or_else(|| "database".to_string(), |s| s.to_string_lossy().into_owned())
    }

    /// Input file extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.input_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
    }

    /// Appends the input's extension (if any) to a base file name.
    fn with_extension(&self, base: String) -> String {
        match self.extension() {
            Some(ext) => format!("{}.{}", base, ext),
            None => base,
        }
    }

    /// Session log file.
    pub fn log_file_path(&self) -> PathBuf {
        self.output_dir()
            .join(format!("repair_{}.log", self.file_stem()))
    }

    /// Structured session report.
    pub fn report_json_path(&self) -> PathBuf {
        self.output_dir()
            .join(format!("repair_report_{}.json", self.file_stem()))
    }

    /// Human-readable session report.
    pub fn report_html_path(&self) -> PathBuf {
        self.output_dir()
            .join(format!("repair_report_{}.html", self.file_stem()))
    }

    /// Directory holding backups.
    pub fn backup_dir(&self) -> PathBuf {
        self.output_dir().join("backups")
    }

    /// Backup path for a session started at `timestamp`.
    pub fn backup_path(&self, timestamp: &str) -> PathBuf {
        self.backup_dir().join(
            self.with_extension(format!("{}_backup_{}", self.file_stem(), timestamp)),
        )
    }

    /// Working copy used by one strategy.
    pub fn candidate_path(&self, timestamp: &str, kind: StrategyKind) -> PathBuf {
        self.output_dir().join(self.with_extension(format!(
            "{}_repaired_{}_{}",
            self.file_stem(),
            timestamp,
            kind.id()
        )))
    }

    /// Message extraction sink.
    pub fn extracted_messages_path(&self) -> PathBuf {
        self.output_dir().join(EXTRACTED_MESSAGES_FILE)
    }
}
