//! Shared fixtures for integration tests.
//!
//! Databases are real SQLite files in temporary directories. Corrupted
//! variants are produced by overwriting bytes at known offsets.

#![allow(dead_code)]

use dbfix_core::database::Database;
use dbfix_core::{RepairConfig, Result};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Offset of the freelist page count in the database header.
pub const FREELIST_COUNT_OFFSET: u64 = 36;

/// Start of page 2 with the default 4096-byte page size.
pub const SECOND_PAGE_OFFSET: u64 = 4096;

/// A recovery tool path that cannot exist, for deterministic sessions.
pub const MISSING_TOOL: &str = "/nonexistent/dbfix-test/sqlite3";

/// The sqlite3 shell used when a test needs the real recovery tool.
pub const RECOVERY_TOOL: &str = "sqlite3";

/// True if the sqlite3 shell can be spawned on this machine.
pub fn recovery_tool_available() -> bool {
    let available = std::process::Command::new(RECOVERY_TOOL)
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success());
    if !available {
        eprintln!("{} not found, skipping", RECOVERY_TOOL);
    }
    available
}

/// Creates a sound database with `test_table` holding three rows.
pub async fn sound_database(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    let db = Database::create(&path, TIMEOUT).await?;
    db.execute("CREATE TABLE test_table (id INTEGER PRIMARY KEY, name TEXT, value INTEGER)")
        .await?;
    db.execute(
        "INSERT INTO test_table VALUES (1, 'Item 1', 100), (2, 'Item 2', 200), (3, 'Item 3', 300)",
    )
    .await?;
    db.close().await;
    Ok(path)
}

/// Creates a database whose header claims five free pages that do not exist.
///
/// Every row stays readable but the integrity check fails.
pub async fn freelist_corrupted_database(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = sound_database(dir, name).await?;
    overwrite(&path, FREELIST_COUNT_OFFSET, &[0, 0, 0, 5]);
    Ok(path)
}

/// Creates a database whose table b-tree page is overwritten with garbage.
pub async fn page_corrupted_database(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = sound_database(dir, name).await?;
    overwrite(&path, SECOND_PAGE_OFFSET, &[0xAB; 64]);
    Ok(path)
}

/// Overwrites bytes of a file in place.
pub fn overwrite(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
}

/// Session configuration writing into `output_dir` with no external tool.
pub fn config(input: &Path, output_dir: &Path) -> RepairConfig {
    RepairConfig::new(input)
        .with_output_dir(output_dir)
        .with_recovery_tool(MISSING_TOOL)
        .with_connect_timeout(TIMEOUT)
}

/// Row count of one table.
pub async fn row_count(path: &Path, table: &str) -> Result<u64> {
    let db = Database::open_read_only(path, TIMEOUT).await?;
    let count = db.count_rows(table).await;
    db.close().await;
    count
}

/// Names of every file directly inside `dir` carrying one of `suffixes`.
pub fn files_with_suffix(dir: &Path, suffixes: &[&str]) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| suffixes.iter().any(|suffix| name.ends_with(suffix)))
        .collect()
}
