//! Jobs run by pool workers
//!
//! Results travel back as typed outcomes; progress text goes to the event
//! stream.

use crate::assertions::{any_failed, format_assertion_results, AssertionResults, AssertionStatus};
use crate::driver::DeploymentDriver;
use crate::events::EventSink;
use crate::pool::ExecutionContext;
use crate::runner::{IntegRunner, RunnerOptions};
use integ_diff::{DestructiveChange, Diagnostic, DiagnosticReason};
use integ_suite::TestUnit;
use std::sync::Arc;
use std::time::Instant;

/// Settings shared by every job of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    /// Destroy after deploying
    pub clean: bool,
    /// Synth only
    pub dry_run: bool,
    /// Verbosity level
    pub verbosity: u8,
    /// Deploy the snapshot before the change
    pub update_workflow: bool,
    /// Keep output of failed snapshot comparisons
    pub inspect_failures: bool,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            clean: true,
            dry_run: false,
            verbosity: 0,
            update_workflow: true,
            inspect_failures: false,
        }
    }
}

impl JobSettings {
    fn runner_options(&self, context: &ExecutionContext) -> RunnerOptions {
        RunnerOptions {
            region: context.region.clone(),
            profile: context.profile.clone(),
            clean: self.clean,
            dry_run: self.dry_run,
            verbosity: self.verbosity,
            update_workflow: self.update_workflow,
            inspect_failures: self.inspect_failures,
        }
    }
}

/// Result of snapshot-testing one unit
#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    /// The unit
    pub unit: TestUnit,
    /// Diagnostics reported, successes included
    pub diagnostics: Vec<Diagnostic>,
    /// Destructive changes found by the diff
    pub destructive_changes: Vec<DestructiveChange>,
}

impl SnapshotOutcome {
    /// Outcome of a snapshot job that panicked
    #[must_use]
    pub fn panicked(unit: TestUnit, message: &str) -> Self {
        let test_name = unit.normalized_test_name().to_string();
        Self {
            diagnostics: vec![Diagnostic::new(
                &test_name,
                &test_name,
                DiagnosticReason::SnapshotError,
                format!("Snapshot test panicked: {message}"),
            )],
            unit,
            destructive_changes: Vec::new(),
        }
    }

    /// Whether the unit failed the snapshot phase
    #[must_use]
    pub fn failed(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_failure)
    }
}

/// Result of integration-testing one unit
#[derive(Debug, Clone)]
pub struct IntegOutcome {
    /// The unit
    pub unit: TestUnit,
    /// Context the unit ran in
    pub context: ExecutionContext,
    /// Diagnostics reported, successes included
    pub diagnostics: Vec<Diagnostic>,
}

impl IntegOutcome {
    /// Outcome of an integration job that panicked
    #[must_use]
    pub fn panicked(context: ExecutionContext, unit: TestUnit, message: &str) -> Self {
        let test_name = unit.normalized_test_name().to_string();
        Self {
            diagnostics: vec![Diagnostic::new(
                format!("{test_name} ({context})"),
                &test_name,
                DiagnosticReason::TestError,
                format!("Integration test panicked: {message}"),
            )],
            unit,
            context,
        }
    }

    /// Whether any test case failed
    #[must_use]
    pub fn failed(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_failure)
    }
}

/// Compare `unit` against its committed snapshot
pub async fn snapshot_job(
    driver: Arc<dyn DeploymentDriver>,
    unit: TestUnit,
    settings: JobSettings,
    events: EventSink,
) -> SnapshotOutcome {
    let started = Instant::now();
    let test_name = unit.normalized_test_name().to_string();
    let mut outcome = SnapshotOutcome {
        unit: unit.clone(),
        diagnostics: Vec::new(),
        destructive_changes: Vec::new(),
    };

    if !unit.has_snapshot() {
        events.warning(&test_name, "no snapshot");
        outcome.diagnostics.push(
            Diagnostic::new(&test_name, &test_name, DiagnosticReason::NoSnapshot, "No Snapshot")
                .with_duration(started.elapsed()),
        );
        return outcome;
    }

    let options = settings.runner_options(&ExecutionContext::new(crate::context::DUMMY_REGION, None));
    let result = match IntegRunner::new(unit, driver, options, events.clone()).await {
        Ok(mut runner) => runner.test_snapshot().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(diff) if diff.is_clean() => {
            outcome.diagnostics.push(
                Diagnostic::new(&test_name, &test_name, DiagnosticReason::SnapshotSuccess, "Success")
                    .with_duration(started.elapsed()),
            );
        }
        Ok(diff) => {
            let duration = started.elapsed();
            outcome
                .diagnostics
                .extend(diff.diagnostics.into_iter().map(|d| d.with_duration(duration)));
            if !diff.destructive_changes.is_empty() {
                let listing: Vec<String> = diff.destructive_changes.iter().map(ToString::to_string).collect();
                outcome.diagnostics.push(
                    Diagnostic::new(
                        &test_name,
                        &test_name,
                        DiagnosticReason::DestructiveChanges,
                        format!("{} destructive change(s):\n{}", listing.len(), listing.join("\n")),
                    )
                    .with_duration(duration),
                );
            }
            outcome.destructive_changes = diff.destructive_changes;
        }
        Err(e) => {
            tracing::warn!(test = %test_name, error = %e, "snapshot test errored");
            outcome.diagnostics.push(
                Diagnostic::new(&test_name, &test_name, DiagnosticReason::SnapshotError, e.to_string())
                    .with_duration(started.elapsed()),
            );
        }
    }
    outcome
}

/// Deploy every test case of `unit` in `context`
pub async fn integ_job(
    driver: Arc<dyn DeploymentDriver>,
    context: ExecutionContext,
    unit: TestUnit,
    destructive_changes: Vec<DestructiveChange>,
    settings: JobSettings,
    events: EventSink,
) -> IntegOutcome {
    let started = Instant::now();
    let mut outcome = IntegOutcome {
        unit: unit.clone(),
        context: context.clone(),
        diagnostics: Vec::new(),
    };
    let file_name = unit.file_name().display().to_string();

    let options = settings.runner_options(&context);
    let mut runner = match IntegRunner::new(unit, driver, options, events.clone()).await {
        Ok(runner) => runner,
        Err(e) => {
            outcome.diagnostics.push(
                Diagnostic::new(
                    format!("{file_name} ({context})"),
                    &file_name,
                    e.reason(),
                    format!("Error during integration test: {e}"),
                )
                .with_duration(started.elapsed()),
            );
            return outcome;
        }
    };

    let test_name = runner.test_name().to_string();
    let case_names: Vec<String> = runner.actual_suite().test_cases().keys().cloned().collect();
    if case_names.is_empty() {
        let e = crate::error::IntegError::NoTestCases { test: test_name.clone() };
        outcome.diagnostics.push(
            Diagnostic::new(
                format!("{file_name} ({context})"),
                &file_name,
                e.reason(),
                format!("Error during integration test: {e}"),
            )
            .with_duration(started.elapsed()),
        );
        return outcome;
    }

    for case_name in case_names {
        events.progress(&test_name, format!("running {case_name} in {context}"));
        let case_started = Instant::now();
        let result = runner
            .run_test_case(&case_name, destructive_changes.clone())
            .await;
        let duration = case_started.elapsed();

        let name = format!("{test_name}-{case_name} ({context})");
        outcome.diagnostics.extend(
            case_diagnostics(&name, &case_name, result)
                .into_iter()
                .map(|d| d.with_duration(duration)),
        );
    }
    outcome
}

/// Diagnostics for one test case: one per failing assertion, else a single
/// success or failure
fn case_diagnostics(
    name: &str,
    case_name: &str,
    result: crate::error::IntegResult<Option<AssertionResults>>,
) -> Vec<Diagnostic> {
    match result {
        Ok(Some(results)) if any_failed(&results) => results
            .iter()
            .filter(|(_, r)| r.status == AssertionStatus::Fail)
            .map(|(id, r)| {
                Diagnostic::new(
                    name,
                    case_name,
                    DiagnosticReason::AssertionFailed,
                    format!("{id} - failed\n{}", r.message.as_deref().unwrap_or_default()),
                )
            })
            .collect(),
        Ok(results) => vec![Diagnostic::new(
            name,
            case_name,
            DiagnosticReason::TestSuccess,
            results.map_or_else(|| "NO ASSERTIONS".to_string(), |r| format_assertion_results(&r)),
        )],
        Err(e) => vec![Diagnostic::new(
            name,
            case_name,
            DiagnosticReason::TestFailed,
            format!("Integration test failed: {e}"),
        )],
    }
}
