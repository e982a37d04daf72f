//! Test runner
//!
//! [`IntegRunner`] owns the lifecycle of one test unit. Construction loads
//! the committed snapshot suite (if any) and synthesizes the current source
//! once to learn the actual suite; the snapshot comparison, per-case
//! deployment and watch operations all start from that prepared state.

mod compare;
mod lifecycle;
mod watch;
mod write;

use crate::context::{dummy_env, merged_context};
use crate::driver::{DeploymentDriver, ListRequest, SynthContext, SynthRequest};
use crate::error::{IntegError, IntegResult};
use crate::events::EventSink;
use crate::state::{RunnerPhase, RunnerState, ScratchDir};
use integ_suite::{LegacySuite, TestSuite, TestUnit};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub use watch::WatchOutcome;

/// Per-run settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Target region
    pub region: String,
    /// Credentials profile
    pub profile: Option<String>,
    /// Destroy after deploying
    pub clean: bool,
    /// Synth only
    pub dry_run: bool,
    /// Verbosity level; above zero adds repro commands
    pub verbosity: u8,
    /// Deploy the snapshot before the change
    pub update_workflow: bool,
    /// Keep output of failed snapshot comparisons
    pub inspect_failures: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            region: crate::context::DUMMY_REGION.to_string(),
            profile: None,
            clean: true,
            dry_run: false,
            verbosity: 0,
            update_workflow: true,
            inspect_failures: false,
        }
    }
}

impl RunnerOptions {
    /// Create new options targeting `region`
    #[inline]
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..Self::default()
        }
    }

    /// With credentials profile
    #[inline]
    #[must_use]
    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }
}

/// Runner for one test unit
pub struct IntegRunner {
    unit: TestUnit,
    driver: Arc<dyn DeploymentDriver>,
    options: RunnerOptions,
    events: EventSink,
    prepared: RunnerState,
    actual: TestSuite,
    scratch: ScratchDir,
}

impl std::fmt::Debug for IntegRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegRunner")
            .field("unit", &self.unit)
            .field("options", &self.options)
            .field("phase", &self.prepared.phase())
            .finish_non_exhaustive()
    }
}

impl IntegRunner {
    /// Load the expected suite and synthesize the actual one
    ///
    /// # Errors
    /// - `LegacyWithoutSnapshot` for a legacy unit with no snapshot
    /// - driver, manifest and suite errors from loading either suite
    pub async fn new(
        unit: TestUnit,
        driver: Arc<dyn DeploymentDriver>,
        options: RunnerOptions,
        events: EventSink,
    ) -> IntegResult<Self> {
        let scratch = ScratchDir::new(unit.temporary_output_dir());
        let mut runner = Self {
            unit,
            driver,
            options,
            events,
            prepared: RunnerState::new(),
            actual: TestSuite::declared(Default::default()),
            scratch,
        };

        let mut state = RunnerState::new();
        if runner.unit.has_snapshot() {
            let expected = runner.load_suite(runner.unit.snapshot_dir(), &state).await?;
            if let Some(context) = expected.legacy_context() {
                state.legacy_context.clone_from(context);
            }
            state.expected = Some(expected);
            state = state.advance(RunnerPhase::ExpectedLoaded)?;
        } else {
            state = state.advance(RunnerPhase::NoExpected)?;
        }

        runner.synth_into(runner.scratch.path(), &state).await?;
        let actual = runner.load_suite(runner.scratch.path(), &state).await?;
        if actual.is_legacy() && state.expected.is_none() {
            return Err(IntegError::LegacyWithoutSnapshot {
                test: runner.test_name().to_string(),
            });
        }
        if let Some(context) = actual.legacy_context() {
            state.legacy_context.clone_from(context);
        }
        state.actual = Some(actual.clone());
        runner.actual = actual;
        runner.prepared = state.advance(RunnerPhase::ActualSynthesized)?;

        tracing::debug!(
            test = %runner.test_name(),
            expected = runner.prepared.expected.is_some(),
            "runner prepared"
        );
        Ok(runner)
    }

    /// Normalized test name
    #[inline]
    #[must_use]
    pub fn test_name(&self) -> &str {
        self.unit.normalized_test_name()
    }

    /// Test unit
    #[inline]
    #[must_use]
    pub fn unit(&self) -> &TestUnit {
        &self.unit
    }

    /// Run settings
    #[inline]
    #[must_use]
    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Prepared state every operation starts from
    #[inline]
    #[must_use]
    pub fn state(&self) -> &RunnerState {
        &self.prepared
    }

    /// Suite of the fresh synth
    #[inline]
    #[must_use]
    pub fn actual_suite(&self) -> &TestSuite {
        &self.actual
    }

    /// Suite of the committed snapshot
    #[inline]
    #[must_use]
    pub fn expected_suite(&self) -> Option<&TestSuite> {
        self.prepared.expected.as_ref()
    }

    /// Whether the scratch output will be kept for inspection
    #[inline]
    #[must_use]
    pub fn retains_output(&self) -> bool {
        self.scratch.is_retained()
    }

    /// Synth context: fixed lookup answers, legacy pragmas, then declared
    /// context of the actual suite
    fn context(&self, state: &RunnerState) -> SynthContext {
        let declared = state
            .actual
            .as_ref()
            .and_then(TestSuite::synth_context)
            .cloned()
            .unwrap_or_default();
        merged_context([&state.legacy_context, &declared])
    }

    /// Synth context the committed snapshot was produced with
    fn snapshot_context(&self) -> SynthContext {
        let expected = self.expected_suite();
        let legacy = expected
            .and_then(TestSuite::legacy_context)
            .cloned()
            .unwrap_or_default();
        let declared = expected
            .and_then(TestSuite::synth_context)
            .cloned()
            .unwrap_or_default();
        merged_context([&legacy, &declared])
    }

    fn working_dir(&self) -> &Path {
        self.unit.directory()
    }

    async fn synth_into(&self, output_dir: &Path, state: &RunnerState) -> IntegResult<()> {
        self.driver
            .synth(SynthRequest {
                app: self.unit.app_command(),
                working_dir: self.working_dir().to_path_buf(),
                output_dir: output_dir.to_path_buf(),
                env: dummy_env(),
                context: self.context(state),
            })
            .await?;
        Ok(())
    }

    /// Load the suite in `directory`, falling back to legacy inference
    async fn load_suite(&self, directory: &Path, state: &RunnerState) -> IntegResult<TestSuite> {
        match TestSuite::from_manifest_dir(directory) {
            Ok(suite) => return Ok(suite),
            Err(e) => {
                tracing::debug!(
                    test = %self.test_name(),
                    directory = %directory.display(),
                    reason = %e,
                    "no declared test suite, inferring from legacy directive"
                );
            }
        }

        let stacks = self
            .driver
            .list_stacks(ListRequest {
                app: self.unit.app_command(),
                working_dir: self.working_dir().to_path_buf(),
                context: self.context(state),
                output_dir: Some(self.scratch.path().to_path_buf()),
                profile: self.options.profile.clone(),
            })
            .await?;
        let source = std::fs::read_to_string(self.unit.file_name())
            .map_err(|e| IntegError::io_error(self.unit.file_name(), e))?;
        let legacy = LegacySuite::infer(self.test_name(), &source, &stacks)?;
        Ok(TestSuite::Legacy(legacy))
    }

    /// Command line reproducing the synth of this unit
    #[must_use]
    pub fn repro_command(&self) -> String {
        let env: BTreeMap<String, String> = dummy_env();
        let mut parts: Vec<String> = env.iter().map(|(k, v)| format!("{k}='{v}'")).collect();
        parts.push("cdk synth".to_string());
        parts.push(format!("-a '{}'", self.unit.app_command()));
        parts.push(format!("-o '{}'", self.scratch.path().display()));
        for (key, value) in &self.prepared.legacy_context {
            parts.push(format!("-c '{key}={value}'"));
        }
        if let Some(declared) = self.actual_suite().synth_context() {
            for (key, value) in declared {
                parts.push(format!("-c '{key}={value}'"));
            }
        }
        parts.join(" ")
    }

    /// Command line destroying the stacks of `case`
    fn destroy_command(&self, stacks: &[String]) -> String {
        let mut parts = vec![
            "cdk destroy".to_string(),
            format!("-a '{}'", self.unit.app_command()),
        ];
        parts.extend(stacks.iter().cloned());
        if let Some(profile) = &self.options.profile {
            parts.push(format!("--profile {profile}"));
        }
        parts.join(" ")
    }
}
