//! Snapshot write and post-write normalization

use super::IntegRunner;
use crate::error::{IntegError, IntegResult};
use crate::state::{RunnerPhase, RunnerState};
use integ_assembly::{AssemblyManifestReader, ManifestError};
use integ_diff::traces_for;
use integ_suite::TestSuite;
use std::fs;
use std::path::Path;

impl IntegRunner {
    /// Replace the snapshot directory with this run's output
    ///
    /// Suites needing lookups are synthesized again with the fixed context so
    /// the snapshot stays environment independent; otherwise the scratch
    /// output is moved into place.
    pub(super) async fn write_snapshot(&self, state: RunnerState) -> IntegResult<RunnerState> {
        let snapshot_dir = self.unit.snapshot_dir();
        if snapshot_dir.exists() {
            fs::remove_dir_all(snapshot_dir).map_err(|e| IntegError::io_error(snapshot_dir, e))?;
        }

        if self.actual_suite().enable_lookups() {
            self.synth_into(snapshot_dir, &state).await?;
        } else {
            move_dir(self.scratch.path(), snapshot_dir)?;
        }

        self.normalize_snapshot(&state)?;
        if let TestSuite::Legacy(legacy) = self.actual_suite() {
            legacy.save_manifest(snapshot_dir)?;
        }

        self.events
            .progress(self.test_name(), format!("snapshot written to {}", snapshot_dir.display()));
        state.advance(RunnerPhase::SnapshotWritten)
    }

    fn normalize_snapshot(&self, state: &RunnerState) -> IntegResult<()> {
        let snapshot_dir = self.unit.snapshot_dir();
        if !snapshot_dir.exists() {
            return Ok(());
        }

        let mut reader = AssemblyManifestReader::from_path(snapshot_dir)?;
        for stack in self.actual_suite().stacks_without_update_workflow() {
            match reader.remove_assets_for_stack(&stack) {
                Ok(removed) => {
                    tracing::debug!(test = %self.test_name(), %stack, removed, "removed assets of stack without update workflow");
                }
                Err(ManifestError::ArtifactNotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        remove_asset_zip_cache(snapshot_dir)?;

        reader.clean_manifest();
        reader.record_trace(&traces_for(&state.destructive_changes));
        reader.save()?;
        Ok(())
    }
}

/// Rename `from` to `to`, copying when they are on different filesystems
fn move_dir(from: &Path, to: &Path) -> IntegResult<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_dir(from, to)?;
    fs::remove_dir_all(from).map_err(|e| IntegError::io_error(from, e))
}

fn copy_dir(from: &Path, to: &Path) -> IntegResult<()> {
    fs::create_dir_all(to).map_err(|e| IntegError::io_error(to, e))?;
    let entries = fs::read_dir(from).map_err(|e| IntegError::io_error(from, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| IntegError::io_error(from, e))?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| IntegError::io_error(&source, e))?;
        if file_type.is_dir() {
            copy_dir(&source, &target)?;
        } else {
            fs::copy(&source, &target).map_err(|e| IntegError::io_error(&source, e))?;
        }
    }
    Ok(())
}

/// Delete `asset.*.zip` bundles at the top of `directory`
fn remove_asset_zip_cache(directory: &Path) -> IntegResult<()> {
    let entries = fs::read_dir(directory).map_err(|e| IntegError::io_error(directory, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| IntegError::io_error(directory, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let path = entry.path();
        if name.starts_with("asset.") && name.ends_with(".zip") && path.is_file() {
            fs::remove_file(&path).map_err(|e| IntegError::io_error(&path, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn zip_cache_removed_but_asset_dirs_kept() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("asset.abc.zip"), b"zip").unwrap();
        fs::create_dir(dir.path().join("asset.abc")).unwrap();
        fs::write(dir.path().join("manifest.json"), b"{}").unwrap();

        remove_asset_zip_cache(dir.path()).unwrap();

        assert!(!dir.path().join("asset.abc.zip").exists());
        assert!(dir.path().join("asset.abc").is_dir());
        assert!(dir.path().join("manifest.json").exists());
    }

    #[test]
    fn move_dir_carries_nested_files() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("out");
        fs::create_dir_all(from.join("asset.x")).unwrap();
        fs::write(from.join("asset.x/index.js"), b"js").unwrap();
        let to = dir.path().join("integ.a.js.snapshot");

        move_dir(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(to.join("asset.x/index.js")).unwrap(), b"js");
    }

    #[test]
    fn copy_dir_duplicates_tree() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a");
        fs::create_dir_all(from.join("b")).unwrap();
        fs::write(from.join("b/c.json"), b"{}").unwrap();
        let to = dir.path().join("copy");
        copy_dir(&from, &to).unwrap();
        assert!(to.join("b/c.json").exists());
        assert!(from.join("b/c.json").exists());
    }
}
