//! SQLite container opening.
//!
//! Every handle is a single-connection pool. Writable handles use the DELETE
//! journal mode so a container is always one self-contained file that can be
//! copied or renamed while no handle is open.
//!
//! # Open Modes
//! - Read-only: validation of the original input, opened immutable so the
//!   directory holding it is left untouched as well
//! - Read-write: strategies working on their own working copy
//! - Create: fresh, empty sibling containers for rebuild strategies

use super::Database;
use crate::Result;
use crate::error::DbFixError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// The 16-byte signature every SQLite container starts with.
pub const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// How a container is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing container, no writes
    ReadOnly,
    /// Existing container, writable
    ReadWrite,
    /// New empty container; any existing file at the path is replaced
    Create,
}

/// Reads up to the first 16 bytes of a file.
pub async fn read_header(path: &Path) -> Result<Vec<u8>> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| DbFixError::io("Failed to open file for header check", path, e))?;

    let mut header = Vec::with_capacity(SQLITE_HEADER.len());
    file.take(SQLITE_HEADER.len() as u64)
        .read_to_end(&mut header)
        .await
        .map_err(|e| DbFixError::io("Failed to read file header", path, e))?;

    Ok(header)
}

/// Returns true if the file starts with the SQLite container signature.
///
/// Files shorter than 16 bytes never match.
pub async fn has_valid_header(path: &Path) -> Result<bool> {
    let header = read_header(path).await?;
    Ok(header.as_slice() == SQLITE_HEADER.as_slice())
}

impl Database {
    /// Opens an existing container for reading and writing.
    ///
    /// # Errors
    /// Returns `Connection` if the file is missing, is not a SQLite
    /// container, or the engine refuses to open it.
    pub async fn open(path: &Path, connect_timeout: Duration) -> Result<Self> {
        Self::connect(path, OpenMode::ReadWrite, connect_timeout).await
    }

    /// Opens an existing container without write access.
    pub async fn open_read_only(path: &Path, connect_timeout: Duration) -> Result<Self> {
        Self::connect(path, OpenMode::ReadOnly, connect_timeout).await
    }

    /// Creates a brand-new empty container at `path`.
    pub async fn create(path: &Path, connect_timeout: Duration) -> Result<Self> {
        Self::connect(path, OpenMode::Create, connect_timeout).await
    }

    /// Opens a container in the given mode.
    pub async fn connect(path: &Path, mode: OpenMode, connect_timeout: Duration) -> Result<Self> {
        match mode {
            OpenMode::Create => {
                if tokio::fs::try_exists(path).await.unwrap_or(false) {
                    tokio::fs::remove_file(path).await.map_err(|e| {
                        DbFixError::io("Failed to remove stale container", path, e)
                    })?;
                }
            }
            OpenMode::ReadOnly | OpenMode::ReadWrite => {
                ensure_container(path).await?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(0)
            .acquire_timeout(connect_timeout)
            .connect_with(connect_options(path, mode))
            .await
            .map_err(|e| {
                DbFixError::connection_failed(
                    format!("Engine refused to open {}", path.display()),
                    e,
                )
            })?;

        tracing::debug!("Opened {} ({:?})", path.display(), mode);

        Ok(Self {
            pool,
            path: PathBuf::from(path),
        })
    }
}

/// Fails with `Connection` unless `path` exists and carries the signature.
async fn ensure_container(path: &Path) -> Result<()> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(DbFixError::connection_refused(format!(
            "File not found: {}",
            path.display()
        )));
    }

    match has_valid_header(path).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(DbFixError::connection_refused(format!(
            "Not a valid SQLite database (header check failed): {}",
            path.display()
        ))),
        Err(e) => Err(DbFixError::connection_refused(format!(
            "Error checking SQLite header: {}",
            e
        ))),
    }
}

/// Builds engine options for a container path.
fn connect_options(path: &Path, mode: OpenMode) -> SqliteConnectOptions {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .foreign_keys(false);

    match mode {
        // Immutable opens never create -wal or -shm files next to the input.
        OpenMode::ReadOnly => options.read_only(true).immutable(true),
        OpenMode::ReadWrite => options.journal_mode(SqliteJournalMode::Delete),
        OpenMode::Create => options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete),
    }
}
