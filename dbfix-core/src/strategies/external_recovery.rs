//! Recovery through the sqlite3 shell.
//!
//! The shell's `.recover` command walks the damaged file page by page and
//! prints a SQL script that rebuilds whatever it could read. The script is
//! replayed into a brand-new container, which then replaces the working copy.
//! Exit codes are recorded but never decide success; only the produced files
//! do.

use super::{
    RECOVER_SCRIPT_SUFFIX, RECOVERED_SUFFIX, RepairStrategy, StrategyKind, StrategyOutcome,
    is_non_empty_file, remove_artifact, replace_file, sibling_path,
};
use crate::Result;
use crate::error::{DbFixError, error_chain};
use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct ExternalRecoveryRepair {
    tool: String,
}

impl ExternalRecoveryRepair {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }

    /// Runs `<tool> --version`, failing if the program cannot be spawned.
    async fn probe_tool(&self) -> Result<String> {
        let output = Command::new(&self.tool)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.unavailable(e))?;

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn unavailable(&self, source: std::io::Error) -> DbFixError {
        DbFixError::ToolUnavailable {
            tool: self.tool.clone(),
            source,
        }
    }

    /// Dumps the recoverable content of `database` into `script`.
    ///
    /// `output()` would replace the configured stdout with a pipe, so the
    /// child is spawned and awaited directly.
    async fn dump_script(&self, database: &Path, script: &Path) -> Result<Output> {
        let script_file = tokio::fs::File::create(script)
            .await
            .map_err(|e| DbFixError::io("Failed to create recovery script", script, e))?
            .into_std()
            .await;

        Command::new(&self.tool)
            .arg(database)
            .arg(".recover")
            .stdin(Stdio::null())
            .stdout(Stdio::from(script_file))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.unavailable(e))?
            .wait_with_output()
            .await
            .map_err(|e| DbFixError::io("Failed to wait for recovery tool", database, e))
    }

    /// Replays `script` into a new container at `target`.
    async fn replay_script(&self, target: &Path, script: &Path) -> Result<Output> {
        Command::new(&self.tool)
            .arg(target)
            .arg(read_command(script))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.unavailable(e))
    }

    async fn recover(
        &self,
        working_copy: &Path,
        script: &Path,
        rebuilt: &Path,
        outcome: &mut StrategyOutcome,
    ) -> Result<()> {
        outcome.detail(
            "command",
            format!("{} {} .recover", self.tool, working_copy.display()),
        );
        tracing::info!("Running {} .recover on {}", self.tool, working_copy.display());

        let output = self.dump_script(working_copy, script).await?;
        record_output(outcome, "", &output);

        if !is_non_empty_file(script).await {
            tracing::warn!("Recovery produced no script for {}", working_copy.display());
            return Ok(());
        }

        // The shell creates the target file on first use.
        remove_artifact(rebuilt).await;
        let import = read_command(script);
        outcome.detail(
            "import_command",
            format!("{} {} {}", self.tool, rebuilt.display(), import),
        );
        tracing::info!("Replaying recovery script into {}", rebuilt.display());

        let output = self.replay_script(rebuilt, script).await?;
        record_output(outcome, "import_", &output);

        if !is_non_empty_file(rebuilt).await {
            tracing::warn!("Replaying the recovery script produced an empty database");
            return Ok(());
        }

        replace_file(rebuilt, working_copy).await?;
        tracing::info!("Working copy replaced with recovered database");
        outcome.succeeded = true;
        Ok(())
    }
}

#[async_trait]
impl RepairStrategy for ExternalRecoveryRepair {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ExternalRecovery
    }

    async fn attempt(&self, working_copy: &Path) -> Result<StrategyOutcome> {
        let mut outcome = StrategyOutcome::default();

        match self.probe_tool().await {
            Ok(version) => outcome.detail("tool_version", version),
            Err(e) => {
                let message = error_chain(&e);
                tracing::warn!("Recovery tool not available: {}", message);
                outcome.detail("error", message);
                return Ok(outcome);
            }
        }

        let script = sibling_path(working_copy, RECOVER_SCRIPT_SUFFIX);
        let rebuilt = sibling_path(working_copy, RECOVERED_SUFFIX);

        let result = self
            .recover(working_copy, &script, &rebuilt, &mut outcome)
            .await;

        remove_artifact(&script).await;
        remove_artifact(&rebuilt).await;

        result.map(|()| outcome)
    }
}

/// The `.read` dot-command for a script path.
///
/// Single-quoted arguments are taken literally by the shell, so paths with
/// spaces or backslashes survive.
fn read_command(script: &Path) -> String {
    format!(".read '{}'", script.display())
}

/// Records exit code and stderr of one tool invocation.
fn record_output(outcome: &mut StrategyOutcome, prefix: &str, output: &Output) {
    outcome.detail(&format!("{}return_code", prefix), output.status.code());
    outcome.detail(
        &format!("{}stderr", prefix),
        String::from_utf8_lossy(&output.stderr).trim().to_string(),
    );
    if !output.status.success() {
        tracing::warn!(
            "Recovery tool {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_command_quotes_path() {
        assert_eq!(
            read_command(Path::new("/tmp/my dir/x.db.recover.sql")),
            ".read '/tmp/my dir/x.db.recover.sql'"
        );
    }

    #[tokio::test]
    async fn test_missing_tool_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let working = dir.path().join("copy.db");
        tokio::fs::write(&working, b"whatever").await.unwrap();

        let strategy = ExternalRecoveryRepair::new("/nonexistent/dbfix-test-sqlite3");
        let outcome = strategy.attempt(&working).await.unwrap();

        assert!(!outcome.succeeded);
        assert!(outcome.details.contains_key("error"));
        assert!(!outcome.details.contains_key("command"));
        assert_eq!(tokio::fs::read(&working).await.unwrap(), b"whatever");
    }
}
