//! Best-effort snapshot alignment with the default branch
//!
//! Before the update workflow deploys the committed snapshot, the snapshot
//! directory is checked out from the merge base of `HEAD` and the remote's
//! default branch. Nothing here is allowed to fail the run.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

const HEAD_BRANCH_PREFIX: &str = "HEAD branch: ";

async fn git(cwd: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| tracing::debug!(?args, error = %e, "git not runnable"))
        .ok()?;
    if !output.status.success() {
        tracing::debug!(
            ?args,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "git command failed"
        );
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Default branch named in `git remote show origin` output
#[must_use]
pub fn parse_head_branch(remote_show: &str) -> Option<&str> {
    remote_show
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(HEAD_BRANCH_PREFIX))
        .map(str::trim)
        .filter(|b| !b.is_empty() && *b != "(unknown)")
}

/// Check out `snapshot_dir` from the merge base with the default branch
///
/// Returns whether the checkout happened.
pub async fn checkout_merge_base(cwd: &Path, snapshot_dir: &Path) -> bool {
    let Some(remote) = git(cwd, &["remote", "show", "origin"]).await else {
        tracing::warn!(
            snapshot = %snapshot_dir.display(),
            "could not determine the default branch; check out the snapshot from the merge base manually"
        );
        return false;
    };
    let Some(branch) = parse_head_branch(&remote) else {
        return false;
    };
    let Some(base) = git(cwd, &["merge-base", "HEAD", branch]).await else {
        return false;
    };

    let relative = snapshot_dir.strip_prefix(cwd).unwrap_or(snapshot_dir);
    let relative = relative.to_string_lossy();
    let checked_out = git(cwd, &["checkout", &base, "--", &relative]).await.is_some();
    if checked_out {
        tracing::info!(snapshot = %snapshot_dir.display(), %base, "snapshot aligned with merge base");
    }
    checked_out
}
