//! Two-phase run over every discovered unit
//!
//! The snapshot phase compares every unit on a local pool; the integration
//! phase deploys the selected units on one worker per execution context.

use crate::config::RunnerConfig;
use crate::driver::DeploymentDriver;
use crate::events::EventSink;
use crate::pool::{execution_contexts, WorkerPool};
use crate::summary::RunSummary;
use crate::worker::{integ_job, snapshot_job, IntegOutcome, JobSettings, SnapshotOutcome};
use integ_diff::DestructiveChange;
use integ_suite::TestUnit;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Drives both phases of a run
pub struct Orchestrator {
    driver: Arc<dyn DeploymentDriver>,
    config: RunnerConfig,
    events: EventSink,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create new orchestrator
    #[must_use]
    pub fn new(driver: Arc<dyn DeploymentDriver>, config: RunnerConfig, events: EventSink) -> Self {
        Self {
            driver,
            config,
            events,
        }
    }

    fn settings(&self) -> JobSettings {
        JobSettings {
            clean: self.config.clean,
            dry_run: self.config.dry_run,
            verbosity: self.config.verbosity,
            update_workflow: self.config.update_workflow,
            inspect_failures: self.config.inspect_failures,
        }
    }

    /// Snapshot-test every unit
    pub async fn run_snapshots(&self, units: Vec<TestUnit>) -> (Vec<SnapshotOutcome>, Vec<crate::pool::ContextMetrics>) {
        let pool = WorkerPool::local(self.config.max_workers);
        let driver = Arc::clone(&self.driver);
        let settings = self.settings();
        let events = self.events.clone();

        tracing::info!(units = units.len(), workers = pool.contexts().len(), "running snapshot tests");
        let report = pool
            .drain(
                units,
                move |_context, unit| {
                    snapshot_job(Arc::clone(&driver), unit, settings.clone(), events.clone())
                },
                |_context, unit, message| SnapshotOutcome::panicked(unit, &message),
            )
            .await;
        (report.results, report.metrics)
    }

    /// Deploy every unit in `units`, recording `destructive` changes into
    /// the snapshots they write
    pub async fn run_integ(
        &self,
        units: Vec<TestUnit>,
        destructive: BTreeMap<String, Vec<DestructiveChange>>,
    ) -> (Vec<IntegOutcome>, Vec<crate::pool::ContextMetrics>) {
        let contexts = execution_contexts(&self.config.parallel_regions, &self.config.profiles);
        let pool = WorkerPool::new(contexts);
        let driver = Arc::clone(&self.driver);
        let settings = self.settings();
        let events = self.events.clone();
        let destructive = Arc::new(destructive);

        tracing::info!(units = units.len(), contexts = pool.contexts().len(), "running integration tests");
        let report = pool
            .drain(
                units,
                move |context, unit| {
                    let changes = destructive
                        .get(unit.normalized_test_name())
                        .cloned()
                        .unwrap_or_default();
                    integ_job(
                        Arc::clone(&driver),
                        context,
                        unit,
                        changes,
                        settings.clone(),
                        events.clone(),
                    )
                },
                |context, unit, message| IntegOutcome::panicked(context, unit, &message),
            )
            .await;
        (report.results, report.metrics)
    }

    /// Units the integration phase runs
    ///
    /// Every unit with `force`; otherwise units that failed the snapshot
    /// phase, and only when `update_on_failed` is set.
    #[must_use]
    pub fn select_for_integ(&self, snapshots: &[SnapshotOutcome]) -> Vec<TestUnit> {
        snapshots
            .iter()
            .filter(|o| self.config.force || (self.config.update_on_failed && o.failed()))
            .map(|o| o.unit.clone())
            .collect()
    }

    /// Run both phases
    pub async fn run(&self, units: Vec<TestUnit>) -> RunSummary {
        let (snapshots, snapshot_metrics) = self.run_snapshots(units).await;

        let selected = self.select_for_integ(&snapshots);
        let (integ, integ_metrics) = if selected.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            let destructive = snapshots
                .iter()
                .filter(|o| !o.destructive_changes.is_empty())
                .map(|o| (o.unit.normalized_test_name().to_string(), o.destructive_changes.clone()))
                .collect();
            self.run_integ(selected, destructive).await
        };

        RunSummary {
            snapshots,
            integ,
            snapshot_metrics,
            integ_metrics,
        }
    }
}
