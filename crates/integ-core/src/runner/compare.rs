//! Snapshot comparison

use super::IntegRunner;
use crate::error::IntegResult;
use crate::events::EventKind;
use crate::state::RunnerPhase;
use integ_assembly::SnapshotAssembly;
use integ_diff::{diff_assembly, AssemblyDiff};

impl IntegRunner {
    /// Compare a fresh synth against the committed snapshot
    ///
    /// The app is synthesized again into the scratch directory; both sides
    /// are restricted to the stacks their suite names. When the diff is not
    /// clean the first diagnostic gets the output locations (and the scratch
    /// output is kept) if failures are inspected, and a repro command if
    /// running verbose.
    ///
    /// # Errors
    /// Synth and manifest errors
    pub async fn test_snapshot(&mut self) -> IntegResult<AssemblyDiff> {
        let state = self.prepared.clone();
        self.synth_into(self.scratch.path(), &state).await?;

        let expected = match self.expected_suite() {
            Some(suite) => SnapshotAssembly::from_dir(self.unit.snapshot_dir(), Some(&suite.stacks()))?,
            None => SnapshotAssembly::new(),
        };
        let actual = SnapshotAssembly::from_dir(
            self.scratch.path(),
            Some(&self.actual_suite().stacks()),
        )?;

        let mut diff = diff_assembly(self.test_name(), &expected, &actual, self.actual_suite());
        let state = state.advance(RunnerPhase::SnapshotCompared)?;

        if let Some(first) = diff.diagnostics.first_mut() {
            if self.options.inspect_failures {
                first.additional_messages.push(format!(
                    "Snapshot: {}\nActual: {}",
                    self.unit.snapshot_dir().display(),
                    self.scratch.path().display()
                ));
                self.scratch.retain();
            }
            if self.options.verbosity > 0 {
                let repro = self.repro_command();
                first.additional_messages.push(format!("Repro:\n  {repro}"));
                self.events.emit(self.test_name(), EventKind::Repro, repro);
            }
        }

        self.scratch.clear();
        let state = state.advance(RunnerPhase::CleanedUp)?;
        tracing::debug!(
            test = %self.test_name(),
            history = ?state.history(),
            diagnostics = diff.diagnostics.len(),
            destructive = diff.destructive_changes.len(),
            "snapshot comparison finished"
        );
        Ok(diff)
    }
}
