//! Core engine for repairing corrupted SQLite databases.
//!
//! A repair session backs the input up, validates it, then tries a fixed
//! sequence of increasingly aggressive strategies on isolated copies of the
//! input, keeping whichever result best approximates the original data.
//!
//! # Repair Guarantees
//! - The input file is only ever read and copied, never written
//! - No strategy runs before a backup exists
//! - Every strategy works on its own copy of the original
//! - All data access goes through the SQLite engine; no page-level patching
//!
//! # Architecture
//! - [`validation`] produces a [`ValidationReport`] for any file
//! - [`strategies`] holds the closed set of [`StrategyKind`]s
//! - [`comparator`] ranks candidates against the original baseline
//! - [`orchestrator`] drives the session and owns every output file
//! - [`report`] renders the session as JSON and HTML

pub mod comparator;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod report;
pub mod strategies;
pub mod validation;

// Re-export commonly used types
pub use comparator::{Improvement, compare, is_better};
pub use config::RepairConfig;
pub use error::{DbFixError, Result};
pub use models::{DatabaseInfo, RepairAttempt, RepairSession, SessionStage, ValidationReport};
pub use orchestrator::RepairOrchestrator;
pub use strategies::{RepairStrategy, StrategyKind, StrategyOutcome};
pub use validation::validate;
