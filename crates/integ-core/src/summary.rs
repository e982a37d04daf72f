//! Run summary and exit code

use crate::pool::ContextMetrics;
use crate::worker::{IntegOutcome, SnapshotOutcome};
use integ_diff::{DestructiveChange, Diagnostic};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Outcome of a whole run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Snapshot phase outcomes
    pub snapshots: Vec<SnapshotOutcome>,
    /// Integration phase outcomes
    pub integ: Vec<IntegOutcome>,
    /// Snapshot pool metrics
    pub snapshot_metrics: Vec<ContextMetrics>,
    /// Integration pool metrics
    pub integ_metrics: Vec<ContextMetrics>,
}

impl RunSummary {
    /// Every diagnostic of both phases
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.snapshots
            .iter()
            .flat_map(|o| o.diagnostics.iter())
            .chain(self.integ.iter().flat_map(|o| o.diagnostics.iter()))
    }

    /// Failing diagnostics of both phases
    pub fn failures(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics().filter(|d| d.is_failure())
    }

    /// Destructive changes found by the snapshot phase
    pub fn destructive_changes(&self) -> impl Iterator<Item = &DestructiveChange> {
        self.snapshots.iter().flat_map(|o| o.destructive_changes.iter())
    }

    /// Names of units that failed
    ///
    /// A unit that failed its snapshot comparison counts as passed when the
    /// integration phase then ran it successfully in every context.
    #[must_use]
    pub fn failed_units(&self) -> BTreeSet<String> {
        let integ_ran: BTreeSet<&str> = self
            .integ
            .iter()
            .map(|o| o.unit.normalized_test_name())
            .collect();
        let mut failed: BTreeSet<String> = self
            .integ
            .iter()
            .filter(|o| o.failed())
            .map(|o| o.unit.normalized_test_name().to_string())
            .collect();
        failed.extend(
            self.snapshots
                .iter()
                .filter(|o| o.failed() && !integ_ran.contains(o.unit.normalized_test_name()))
                .map(|o| o.unit.normalized_test_name().to_string()),
        );
        failed
    }

    /// Whether the run passed
    #[must_use]
    pub fn success(&self) -> bool {
        self.destructive_changes().next().is_none() && self.failed_units().is_empty()
    }

    /// Process exit code
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.success())
    }

    /// Table of per-context timings
    #[must_use]
    pub fn render_metrics(&self) -> String {
        let mut out = String::new();
        for (title, metrics) in [("snapshot", &self.snapshot_metrics), ("integration", &self.integ_metrics)] {
            if metrics.iter().all(|m| m.units.is_empty()) {
                continue;
            }
            let _ = writeln!(out, "{title} tests:");
            for context in metrics.iter().filter(|m| !m.units.is_empty()) {
                let _ = writeln!(
                    out,
                    "  {} ({} unit(s), {:.2}s)",
                    context.context,
                    context.units.len(),
                    context.total.as_secs_f64()
                );
                for (unit, elapsed) in &context.units {
                    let _ = writeln!(out, "    {unit}: {:.2}s", elapsed.as_secs_f64());
                }
            }
        }
        out
    }
}
