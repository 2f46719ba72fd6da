//! Error types for repair sessions.
//!
//! The taxonomy mirrors how failures are handled during a repair:
//! engine-level errors (`Connection`, `Query`) are downgraded to diagnostics
//! by the validator and the strategies, anything escaping a strategy becomes a
//! failed attempt, and only initialization or backup failures reach the
//! caller as an `Err`.

use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main error type for dbfix operations.
#[derive(Debug, Error)]
pub enum DbFixError {
    /// File missing, not a valid container, or the engine refused to open it
    #[error("Database connection failed: {context}")]
    Connection {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Malformed statement, missing table, or engine-reported data fault
    #[error("Query failed: {context}")]
    Query {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The external recovery utility could not be invoked at all
    #[error("Recovery tool '{tool}' is not available")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Copy, backup, or report write failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed
    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// HTML report rendering failed
    #[error("Report rendering failed: {context}")]
    Report {
        context: String,
        #[source]
        source: askama::Error,
    },

    /// Configuration or initialization error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A strategy exceeded its wrapping timeout
    #[error("{strategy} timed out after {}s", timeout.as_secs_f64())]
    StrategyTimeout { strategy: String, timeout: Duration },
}

/// Convenience type alias for Results with DbFixError
pub type Result<T> = std::result::Result<T, DbFixError>;

impl DbFixError {
    /// Creates a connection error wrapping an engine error
    pub fn connection_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            context: context.into(),
            source: Some(Box::new(error)),
        }
    }

    /// Creates a connection error with no underlying cause
    pub fn connection_refused(context: impl Into<String>) -> Self {
        Self::Connection {
            context: context.into(),
            source: None,
        }
    }

    /// Creates a query error with context
    pub fn query_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Query {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates an I/O error naming the path involved
    pub fn io(context: impl Into<String>, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context: format!("{} ({})", context.into(), path.display()),
            source,
        }
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Renders an error with its full source chain on one line.
///
/// Engine errors are wrapped once by this crate, so the interesting message
/// (for example "database disk image is malformed") lives in the source.
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut current = error.source();
    while let Some(cause) = current {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        current = cause.source();
    }
    message
}
