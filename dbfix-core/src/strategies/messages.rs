//! Message-database export.
//!
//! Message databases keep their conversations in a `message` table joined to
//! `handle` for the sender. Dates are nanoseconds since 2001-01-01.

use crate::Result;
use crate::database::{Database, row_to_json};
use crate::error::DbFixError;
use std::path::Path;

/// Table whose presence triggers extraction.
pub const MESSAGE_TABLE: &str = "message";

/// Flattened message rows, oldest first.
pub const MESSAGE_QUERY: &str = "SELECT m.rowid AS message_id, m.guid AS unique_id, \
     datetime(m.date/1000000000 + 978307200, 'unixepoch', 'localtime') AS date_sent, \
     m.text AS message_body, m.is_from_me, h.id AS contact_id \
     FROM message m LEFT JOIN handle h ON m.handle_id = h.rowid \
     ORDER BY m.date";

/// Writes every readable message to `output` as a JSON array.
///
/// Returns the number of messages written.
pub async fn extract_messages(db: &Database, output: &Path) -> Result<usize> {
    let rows = db.query_all(MESSAGE_QUERY).await?;
    let messages: Vec<serde_json::Value> = rows.iter().map(row_to_json).collect();

    let json = serde_json::to_string_pretty(&messages)
        .map_err(|e| DbFixError::Serialization {
            context: "Failed to serialize extracted messages".to_string(),
            source: e,
        })?;

    tokio::fs::write(output, json)
        .await
        .map_err(|e| DbFixError::io("Failed to write extracted messages", output, e))?;

    tracing::info!("Extracted {} messages to {}", messages.len(), output.display());
    Ok(messages.len())
}
