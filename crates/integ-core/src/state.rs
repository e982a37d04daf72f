//! Runner state machine
//!
//! A run moves through a fixed set of phases. Each step consumes the
//! [`RunnerState`] and returns the next one, so the sequence of phases a run
//! went through is recorded in its history.

use crate::assertions::AssertionResults;
use crate::error::{IntegError, IntegResult};
use integ_diff::DestructiveChange;
use integ_suite::TestSuite;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

/// Phase of a test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunnerPhase {
    /// Nothing loaded yet
    Constructed,
    /// Snapshot suite loaded
    ExpectedLoaded,
    /// No snapshot on disk
    NoExpected,
    /// Fresh output synthesized and loaded
    ActualSynthesized,
    /// Snapshot diff computed
    SnapshotCompared,
    /// Deploy hooks and deployments in progress
    Deploying,
    /// Snapshot code deployed before the change
    UpdateValidated,
    /// Changed code (and assertion stack) deployed
    AssertionDeployed,
    /// Assertion results read
    AssertionCollected,
    /// Snapshot directory rewritten
    SnapshotWritten,
    /// Run finished and scratch output removed
    CleanedUp,
    /// Run aborted
    Failed,
}

impl Display for RunnerPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Phases reachable from `from`
#[must_use]
pub fn allowed_transitions(from: RunnerPhase) -> Vec<RunnerPhase> {
    use RunnerPhase::*;
    match from {
        Constructed => vec![ExpectedLoaded, NoExpected, Failed],
        ExpectedLoaded | NoExpected => vec![ActualSynthesized, Failed],
        ActualSynthesized => vec![SnapshotCompared, Deploying, SnapshotWritten, CleanedUp, Failed],
        SnapshotCompared => vec![CleanedUp, Failed],
        Deploying => vec![UpdateValidated, AssertionDeployed, Failed],
        UpdateValidated => vec![AssertionDeployed, Failed],
        AssertionDeployed => vec![AssertionCollected, Failed],
        AssertionCollected => vec![SnapshotWritten, CleanedUp, Failed],
        SnapshotWritten => vec![CleanedUp, Failed],
        CleanedUp | Failed => vec![],
    }
}

/// Check that `from -> to` is a legal transition
///
/// # Errors
/// `IllegalTransition` otherwise
pub fn validate_transition(from: RunnerPhase, to: RunnerPhase) -> IntegResult<()> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(IntegError::IllegalTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Everything a run accumulates
#[derive(Debug, Clone)]
pub struct RunnerState {
    phase: RunnerPhase,
    history: Vec<RunnerPhase>,
    /// Suite of the committed snapshot
    pub expected: Option<TestSuite>,
    /// Suite of the fresh synth
    pub actual: Option<TestSuite>,
    /// Context from legacy pragmas, applied to every synth
    pub legacy_context: BTreeMap<String, String>,
    /// Destructive changes to record in the written snapshot
    pub destructive_changes: Vec<DestructiveChange>,
    /// Collected assertion results
    pub assertion_results: Option<AssertionResults>,
}

impl Default for RunnerState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerState {
    /// Create new state in [`RunnerPhase::Constructed`]
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: RunnerPhase::Constructed,
            history: vec![RunnerPhase::Constructed],
            expected: None,
            actual: None,
            legacy_context: BTreeMap::new(),
            destructive_changes: Vec::new(),
            assertion_results: None,
        }
    }

    /// Current phase
    #[inline]
    #[must_use]
    pub fn phase(&self) -> RunnerPhase {
        self.phase
    }

    /// Phases visited, oldest first
    #[inline]
    #[must_use]
    pub fn history(&self) -> &[RunnerPhase] {
        &self.history
    }

    /// Move to `to`
    ///
    /// # Errors
    /// `IllegalTransition` if `to` is not reachable from the current phase
    pub fn advance(mut self, to: RunnerPhase) -> IntegResult<Self> {
        validate_transition(self.phase, to)?;
        tracing::trace!(from = %self.phase, %to, "runner transition");
        self.phase = to;
        self.history.push(to);
        Ok(self)
    }

    /// Whether the run ended in a terminal phase
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        allowed_transitions(self.phase).is_empty()
    }

    /// Whether any collected assertion failed
    #[must_use]
    pub fn assertions_failed(&self) -> bool {
        self.assertion_results
            .as_ref()
            .is_some_and(crate::assertions::any_failed)
    }
}

/// Scratch output directory, removed when dropped unless retained
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    retain: bool,
}

impl ScratchDir {
    /// Create new guard for `path`
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retain: false,
        }
    }

    /// Guarded path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the directory on disk after the run
    pub fn retain(&mut self) {
        self.retain = true;
    }

    /// Whether the directory will be kept
    #[inline]
    #[must_use]
    pub fn is_retained(&self) -> bool {
        self.retain
    }

    /// Remove the directory now unless retained
    pub fn clear(&self) {
        if self.retain || !self.path.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove scratch output");
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn phase_strategy() -> impl Strategy<Value = RunnerPhase> {
        use RunnerPhase::*;
        prop_oneof![
            Just(Constructed),
            Just(ExpectedLoaded),
            Just(NoExpected),
            Just(ActualSynthesized),
            Just(SnapshotCompared),
            Just(Deploying),
            Just(UpdateValidated),
            Just(AssertionDeployed),
            Just(AssertionCollected),
            Just(SnapshotWritten),
            Just(CleanedUp),
            Just(Failed),
        ]
    }

    #[test]
    fn full_deploy_path_is_legal() {
        use RunnerPhase::*;
        let mut state = RunnerState::new();
        for phase in [
            ExpectedLoaded,
            ActualSynthesized,
            Deploying,
            UpdateValidated,
            AssertionDeployed,
            AssertionCollected,
            SnapshotWritten,
            CleanedUp,
        ] {
            state = state.advance(phase).unwrap();
        }
        assert!(state.is_terminal());
        assert_eq!(state.history().len(), 9);
    }

    #[test]
    fn cannot_write_snapshot_before_synth() {
        let err = RunnerState::new()
            .advance(RunnerPhase::SnapshotWritten)
            .unwrap_err();
        assert!(matches!(err, IntegError::IllegalTransition { .. }));
    }

    #[test]
    fn failed_assertions_detected() {
        let mut state = RunnerState::new();
        assert!(!state.assertions_failed());
        state.assertion_results = Some(AssertionResults::from([(
            "AssertionResultsX".to_string(),
            crate::assertions::AssertionResult {
                status: crate::assertions::AssertionStatus::Fail,
                message: None,
            },
        )]));
        assert!(state.assertions_failed());
    }

    #[test]
    fn scratch_dir_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let scratch_path = dir.path().join("cdk-integ.out.integ.a.js.snapshot");
        std::fs::create_dir_all(scratch_path.join("nested")).unwrap();
        drop(ScratchDir::new(&scratch_path));
        assert!(!scratch_path.exists());
    }

    #[test]
    fn retained_scratch_dir_survives() {
        let dir = TempDir::new().unwrap();
        let scratch_path = dir.path().join("out");
        std::fs::create_dir_all(&scratch_path).unwrap();
        let mut scratch = ScratchDir::new(&scratch_path);
        scratch.retain();
        drop(scratch);
        assert!(scratch_path.exists());
    }

    proptest! {
        #[test]
        fn terminal_phases_have_no_exits(to in phase_strategy()) {
            prop_assert!(validate_transition(RunnerPhase::CleanedUp, to).is_err());
            prop_assert!(validate_transition(RunnerPhase::Failed, to).is_err());
        }

        #[test]
        fn every_non_terminal_phase_can_fail(from in phase_strategy()) {
            let terminal = matches!(from, RunnerPhase::CleanedUp | RunnerPhase::Failed);
            prop_assert_eq!(validate_transition(from, RunnerPhase::Failed).is_ok(), !terminal);
        }
    }
}
