//! Corrupted SQLite database repair tool.
//!
//! Backs the input up, then tries increasingly aggressive repair strategies
//! on copies of it and keeps the best result. The input file itself is never
//! modified.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use dbfix_core::config::DEFAULT_RECOVERY_TOOL;
use dbfix_core::logging::session_dispatch;
use dbfix_core::{RepairConfig, RepairOrchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "dbfix")]
#[command(about = "Recover data from corrupted SQLite databases")]
#[command(version)]
#[command(long_about = "
dbfix - Offline repair for corrupted SQLite databases

The input database is backed up first and never modified. Repair strategies
run in order on separate copies of the input:

  1. Basic probe        integrity, quick and foreign-key checks
  2. Compaction         VACUUM rebuild
  3. External recovery  sqlite3 .recover, replayed into a new database
  4. Dump and reload    table-by-table copy into a new database
  5. Salvage            per-table row counts (and message export)

The first result whose integrity check passes ends the run. JSON and HTML
reports plus a log file are written to the output directory.

EXAMPLES:
  dbfix chat.db
  dbfix -o /tmp/repair -l debug chat.db
  dbfix --imessage ~/Library/Messages/chat.db
")]
pub struct Cli {
    /// Database file to repair
    #[arg(help = "Path to the corrupted database file")]
    pub input: PathBuf,

    /// Output directory
    #[arg(
        short,
        long,
        help = "Directory for backups, repaired copies and reports (defaults to the input's directory)"
    )]
    pub output: Option<PathBuf>,

    /// Log level
    #[arg(short, long, value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Message database mode
    #[arg(long, help = "Treat the input as a message database and export messages on salvage")]
    pub imessage: bool,

    /// External recovery utility
    #[arg(
        long,
        env = "DBFIX_RECOVERY_TOOL",
        default_value = DEFAULT_RECOVERY_TOOL,
        help = "sqlite3 shell used by the external recovery strategy"
    )]
    pub recovery_tool: String,

    /// Per-strategy time limit
    #[arg(long, value_name = "SECS", help = "Abandon a strategy after this many seconds")]
    pub strategy_timeout: Option<u64>,
}

/// Log levels accepted on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[value(rename_all = "UPPER")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warning => Self::WARN,
            LogLevel::Error | LogLevel::Critical => Self::ERROR,
        }
    }
}

impl Cli {
    fn to_config(&self) -> RepairConfig {
        let mut config = RepairConfig::new(&self.input)
            .with_message_mode(self.imessage)
            .with_recovery_tool(&self.recovery_tool);

        if let Some(output) = &self.output {
            config = config.with_output_dir(output);
        }
        if let Some(secs) = self.strategy_timeout {
            config = config.with_strategy_timeout(Duration::from_secs(secs));
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Runs one repair session; returns whether a repaired database was adopted.
async fn run(cli: &Cli) -> anyhow::Result<bool> {
    let config = cli.to_config();
    let log_file = config.log_file_path();

    let orchestrator = RepairOrchestrator::new(config)
        .await
        .context("Failed to initialize repair session")?;
    let logger = session_dispatch(cli.log_level.into(), &log_file)
        .context("Failed to set up logging")?;
    let orchestrator = orchestrator.with_logger(logger);

    tokio::select! {
        result = orchestrator.run() => {
            let session = result.context("Repair aborted")?;

            match &session.best_path {
                Some(best) if session.succeeded => {
                    println!("Repair successful!");
                    println!("Repaired database: {}", best.display());
                }
                _ => println!("Repair failed. See {} for details.", log_file.display()),
            }
            if let Some(report) = &session.report_path {
                println!("Repair report: {}", report.display());
            }

            Ok(session.succeeded)
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Repair interrupted");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["dbfix", "chat.db"]).unwrap();
        assert_eq!(cli.input, PathBuf::from("chat.db"));
        assert_eq!(cli.log_level, LogLevel::Info);
        assert!(!cli.imessage);
        assert!(cli.output.is_none());
        assert!(cli.strategy_timeout.is_none());
    }

    #[test]
    fn test_cli_log_level_ignores_case() {
        for value in ["debug", "DEBUG", "Debug"] {
            let cli = Cli::try_parse_from(["dbfix", "-l", value, "chat.db"]).unwrap();
            assert_eq!(cli.log_level, LogLevel::Debug);
        }
        let cli = Cli::try_parse_from(["dbfix", "--log-level", "critical", "chat.db"]).unwrap();
        assert_eq!(tracing::Level::from(cli.log_level), tracing::Level::ERROR);
    }

    #[test]
    fn test_cli_rejects_unknown_level_and_missing_input() {
        assert!(Cli::try_parse_from(["dbfix", "-l", "verbose", "chat.db"]).is_err());
        assert!(Cli::try_parse_from(["dbfix"]).is_err());
    }

    #[test]
    fn test_cli_to_config() {
        let cli = Cli::try_parse_from([
            "dbfix",
            "-o",
            "/tmp/out",
            "--imessage",
            "--recovery-tool",
            "/opt/sqlite/bin/sqlite3",
            "--strategy-timeout",
            "60",
            "/data/chat.db",
        ])
        .unwrap();

        let config = cli.to_config();
        assert_eq!(config.input_path, PathBuf::from("/data/chat.db"));
        assert_eq!(config.output_dir(), PathBuf::from("/tmp/out"));
        assert!(config.message_mode);
        assert_eq!(config.recovery_tool, "/opt/sqlite/bin/sqlite3");
        assert_eq!(config.strategy_timeout, Some(Duration::from_secs(60)));
    }
}
