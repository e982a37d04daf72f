//! Hook commands
//!
//! Each hook is a separate `sh -c` invocation; the first failure stops the
//! remaining hooks and is returned as [`IntegError::Hook`].

use crate::error::{IntegError, IntegResult};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Run `commands` in order with `cwd` as working directory
///
/// # Errors
/// `Hook` on spawn failure or non-zero exit
pub async fn run_hooks(commands: &[String], cwd: &Path) -> IntegResult<()> {
    for command in commands {
        tracing::debug!(%command, cwd = %cwd.display(), "running hook");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| IntegError::Hook {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IntegError::Hook {
                command: command.clone(),
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn hooks_run_in_order_in_cwd() {
        let dir = TempDir::new().unwrap();
        let hooks = vec![
            "echo first >> hooks.log".to_string(),
            "echo second >> hooks.log".to_string(),
        ];
        run_hooks(&hooks, dir.path()).await.unwrap();
        let log = std::fs::read_to_string(dir.path().join("hooks.log")).unwrap();
        assert_eq!(log, "first\nsecond\n");
    }

    #[tokio::test]
    async fn failing_hook_stops_the_chain() {
        let dir = TempDir::new().unwrap();
        let hooks = vec![
            "echo nope >&2; exit 1".to_string(),
            "touch never".to_string(),
        ];
        let err = run_hooks(&hooks, dir.path()).await.unwrap_err();
        assert!(matches!(err, IntegError::Hook { ref message, .. } if message.contains("nope")));
        assert!(err.is_driver_failure());
        assert!(!dir.path().join("never").exists());
    }

    #[tokio::test]
    async fn empty_hooks_succeed() {
        tokio_test::assert_ok!(run_hooks(&[], Path::new(".")).await);
    }
}
