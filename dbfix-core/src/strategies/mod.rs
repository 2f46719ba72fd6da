//! Repair strategies.
//!
//! # Module Structure
//! - `basic_probe`: read-only consistency and foreign-key probes
//! - `compaction`: VACUUM rebuild
//! - `external_recovery`: `.recover` dump replayed by the sqlite3 shell
//! - `dump_reload`: table-by-table copy into a fresh container
//! - `salvage`: per-table row counts, plus message extraction
//! - `messages`: message-database export used by salvage
//!
//! Every strategy receives the path of its own working copy and may only
//! modify that file. Engine errors are downgraded to entries in the outcome
//! details; an `Err` from [`RepairStrategy::attempt`] means the strategy
//! itself broke and is recorded by the orchestrator as a failed attempt.

pub mod basic_probe;
pub mod compaction;
pub mod dump_reload;
pub mod external_recovery;
pub mod messages;
pub mod salvage;

use crate::Result;
use crate::config::RepairConfig;
use crate::error::{DbFixError, error_chain};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use basic_probe::BasicProbeRepair;
pub use compaction::CompactionRepair;
pub use dump_reload::DumpReloadRepair;
pub use external_recovery::ExternalRecoveryRepair;
pub use salvage::SalvageRepair;

/// Strategy-specific diagnostic payload.
pub type Details = serde_json::Map<String, serde_json::Value>;

/// The five repair strategies, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    BasicProbe,
    Compaction,
    ExternalRecovery,
    DumpReload,
    Salvage,
}

/// Identifier and display name per strategy.
const STRATEGY_NAMES: [(StrategyKind, &str, &str); 5] = [
    (StrategyKind::BasicProbe, "basic_probe", "Basic Probe Repair"),
    (StrategyKind::Compaction, "compaction", "Compaction Repair"),
    (
        StrategyKind::ExternalRecovery,
        "external_recovery",
        "External Recovery-Tool Repair",
    ),
    (StrategyKind::DumpReload, "dump_reload", "Dump-and-Reload Repair"),
    (StrategyKind::Salvage, "salvage", "Salvage Repair"),
];

impl StrategyKind {
    /// All strategies in pipeline order.
    pub const ALL: [Self; 5] = [
        Self::BasicProbe,
        Self::Compaction,
        Self::ExternalRecovery,
        Self::DumpReload,
        Self::Salvage,
    ];

    const fn position(self) -> usize {
        match self {
            Self::BasicProbe => 0,
            Self::Compaction => 1,
            Self::ExternalRecovery => 2,
            Self::DumpReload => 3,
            Self::Salvage => 4,
        }
    }

    /// Stable identifier used in file names and reports.
    pub const fn id(self) -> &'static str {
        STRATEGY_NAMES[self.position()].1
    }

    /// Human-readable name.
    pub const fn display_name(self) -> &'static str {
        STRATEGY_NAMES[self.position()].2
    }

    /// Builds the strategy implementation for this kind.
    pub fn instantiate(self, context: &StrategyContext) -> Box<dyn RepairStrategy> {
        match self {
            Self::BasicProbe => Box::new(BasicProbeRepair::new(context.connect_timeout)),
            Self::Compaction => Box::new(CompactionRepair::new(context.connect_timeout)),
            Self::ExternalRecovery => {
                Box::new(ExternalRecoveryRepair::new(context.recovery_tool.clone()))
            }
            Self::DumpReload => Box::new(DumpReloadRepair::new(context.connect_timeout)),
            Self::Salvage => Box::new(SalvageRepair::new(
                context.connect_timeout,
                context.message_mode,
                context.extracted_messages_path.clone(),
            )),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Settings shared by all strategies of a session.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub connect_timeout: Duration,
    pub recovery_tool: String,
    pub message_mode: bool,
    pub extracted_messages_path: PathBuf,
}

impl StrategyContext {
    /// Derives the strategy settings from a session configuration.
    pub fn from_config(config: &RepairConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            recovery_tool: config.recovery_tool.clone(),
            message_mode: config.message_mode,
            extracted_messages_path: config.extracted_messages_path(),
        }
    }
}

/// What a strategy reports back.
#[derive(Debug, Clone, Default)]
pub struct StrategyOutcome {
    pub succeeded: bool,
    pub details: Details,
    /// Set when salvage wrote the extracted messages sink
    pub extracted_messages: Option<PathBuf>,
}

impl StrategyOutcome {
    /// Adds a diagnostic entry.
    pub fn detail(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.details.insert(key.to_string(), value.into());
    }

    /// A failed outcome carrying an engine error under `error`.
    pub fn engine_failure(error: &DbFixError) -> Self {
        let mut outcome = Self::default();
        outcome.detail("error", error_chain(error));
        outcome
    }
}

/// Uniform contract implemented by every strategy.
#[async_trait]
pub trait RepairStrategy: Send + Sync + std::fmt::Debug {
    /// Which strategy this is.
    fn kind(&self) -> StrategyKind;

    /// Attempts to improve the database at `working_copy` in place.
    async fn attempt(&self, working_copy: &Path) -> Result<StrategyOutcome>;
}

/// Suffix of the fresh container built by dump-and-reload.
pub(crate) const RELOAD_SUFFIX: &str = "reload";

/// Suffix of the script written by the recovery tool.
pub(crate) const RECOVER_SCRIPT_SUFFIX: &str = "recover.sql";

/// Suffix of the container the recovery script is replayed into.
pub(crate) const RECOVERED_SUFFIX: &str = "recovered";

const ARTIFACT_SUFFIXES: [&str; 3] = [RELOAD_SUFFIX, RECOVER_SCRIPT_SUFFIX, RECOVERED_SUFFIX];

/// Path of a temporary artifact next to `path`, e.g. `x.db` -> `x.db.reload`.
pub(crate) fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// True if the file exists and is not empty.
pub(crate) async fn is_non_empty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Removes a temporary artifact, ignoring files that are already gone.
pub(crate) async fn remove_artifact(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!("Could not remove {}: {}", path.display(), e);
    }
}

/// Removes every temporary artifact a strategy may leave next to
/// `working_copy`, for attempts abandoned mid-flight.
pub(crate) async fn remove_artifacts(working_copy: &Path) {
    for suffix in ARTIFACT_SUFFIXES {
        remove_artifact(&sibling_path(working_copy, suffix)).await;
    }
}

/// Atomically replaces `target` with `replacement`.
pub(crate) async fn replace_file(replacement: &Path, target: &Path) -> Result<()> {
    tokio::fs::rename(replacement, target)
        .await
        .map_err(|e| DbFixError::io("Failed to replace working copy", target, e))
}
