//! Logging setup for repair sessions.
//!
//! A session logs to the console and to a plain-text log file in the output
//! directory. Instead of installing a process-wide subscriber, the combined
//! subscriber is returned as a [`Dispatch`] that the orchestrator scopes to
//! its own run.

use crate::Result;
use crate::error::DbFixError;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::Dispatch;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;

/// Builds a dispatcher writing to stderr and appending to `log_file`.
///
/// # Arguments
/// * `level` - Maximum level recorded by both outputs
/// * `log_file` - File to append to; created if missing
///
/// # Example
/// ```rust,no_run
/// use dbfix_core::logging::session_dispatch;
/// use std::path::Path;
///
/// let dispatch = session_dispatch(tracing::Level::INFO, Path::new("repair_chat.log"))
///     .expect("Failed to open log file");
/// tracing::dispatcher::with_default(&dispatch, || tracing::info!("ready"));
/// ```
pub fn session_dispatch(level: tracing::Level, log_file: &Path) -> Result<Dispatch> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| DbFixError::io("Failed to open log file", log_file, e))?;

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false);

    let subscriber = tracing_subscriber::registry()
        .with(LevelFilter::from_level(level))
        .with(console)
        .with(file_layer);

    Ok(Dispatch::new(subscriber))
}
