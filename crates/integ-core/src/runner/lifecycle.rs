//! Deploy, update and destroy cycle for one test case

use super::IntegRunner;
use crate::assertions::{process_assertions, AssertionResults, ASSERTION_RESULTS_FILE};
use crate::driver::{DeployRequest, DestroyRequest};
use crate::error::{IntegError, IntegResult};
use crate::events::EventKind;
use crate::expect::classify;
use crate::git::checkout_merge_base;
use crate::hooks::run_hooks;
use crate::state::{RunnerPhase, RunnerState};
use integ_diff::DestructiveChange;
use integ_suite::{CommandAction, TestCase};
use std::path::Path;

impl IntegRunner {
    /// Run test case `case_name` end to end
    ///
    /// Deploys the case (or only synthesizes it on a dry run), writes the
    /// snapshot unless an assertion failed, then destroys the stacks when
    /// cleaning is enabled. Scratch output is removed on every path.
    /// `destructive_changes` are recorded into the written snapshot.
    ///
    /// # Errors
    /// - `UnknownTestCase` if the actual suite has no such case
    /// - any deploy, hook or destroy error the case does not expect
    /// - synth and manifest errors
    pub async fn run_test_case(
        &mut self,
        case_name: &str,
        destructive_changes: Vec<DestructiveChange>,
    ) -> IntegResult<Option<AssertionResults>> {
        let case = self
            .actual_suite()
            .test_cases()
            .get(case_name)
            .cloned()
            .ok_or_else(|| IntegError::UnknownTestCase {
                test: self.test_name().to_string(),
                case: case_name.to_string(),
            })?;

        let mut state = self.prepared.clone();
        state.destructive_changes = destructive_changes;

        let outcome = self.execute_case(state, case_name, &case).await;

        let destroyed = if !self.options.dry_run && self.options.clean && case.options.destroy_enabled() {
            self.destroy_case(&case).await
        } else {
            Ok(())
        };
        self.scratch.clear();

        let state = outcome?;
        destroyed?;
        let state = state.advance(RunnerPhase::CleanedUp)?;
        tracing::debug!(test = %self.test_name(), case = %case_name, history = ?state.history(), "test case finished");
        Ok(state.assertion_results)
    }

    async fn execute_case(
        &self,
        state: RunnerState,
        case_name: &str,
        case: &TestCase,
    ) -> IntegResult<RunnerState> {
        let state = if !self.options.dry_run && case.options.deploy_enabled() {
            let before_deploy = state.clone();
            match self.deploy_case(state.advance(RunnerPhase::Deploying)?, case_name, case).await {
                Ok(state) => state,
                Err(error) => {
                    classify(Err::<(), _>(error), &case.options.expectation(CommandAction::Deploy))?;
                    self.events.progress(
                        self.test_name(),
                        format!("{case_name}: deploy failed as expected"),
                    );
                    before_deploy
                }
            }
        } else {
            self.synth_into(self.scratch.path(), &state).await?;
            state
        };

        if state.assertions_failed() {
            tracing::info!(test = %self.test_name(), case = %case_name, "assertions failed, snapshot not written");
            return Ok(state);
        }
        self.write_snapshot(state).await
    }

    async fn deploy_case(
        &self,
        state: RunnerState,
        case_name: &str,
        case: &TestCase,
    ) -> IntegResult<RunnerState> {
        let hooks = case.options.hooks();
        let hook_dir = self.hook_dir();
        run_hooks(&hooks.pre_deploy, &hook_dir).await?;

        let state = if self.update_workflow_applies(case_name, case) {
            self.deploy_snapshot_code(case_name).await?;
            state.advance(RunnerPhase::UpdateValidated)?
        } else {
            state
        };

        let deploy = DeployRequest {
            app: self.unit.app_command(),
            working_dir: self.working_dir().to_path_buf(),
            stacks: case.stacks.clone(),
            context: self.context(&state),
            output_dir: Some(self.scratch.path().to_path_buf()),
            outputs_file: None,
            rollback: true,
            lookups: self.actual_suite().enable_lookups(),
            region: self.options.region.clone(),
            profile: self.options.profile.clone(),
        };
        self.driver.deploy(deploy.clone()).await?;

        // assertion stacks never roll back so every assertion reports
        let results_file = self.scratch.path().join(ASSERTION_RESULTS_FILE);
        if let Some(assertion_stack) = &case.assertion_stack {
            self.driver
                .deploy(DeployRequest {
                    stacks: vec![assertion_stack.clone()],
                    outputs_file: Some(results_file.clone()),
                    rollback: false,
                    ..deploy
                })
                .await?;
        }
        let mut state = state.advance(RunnerPhase::AssertionDeployed)?;

        run_hooks(&hooks.post_deploy, &hook_dir).await?;

        if case.assertion_stack.is_some() {
            state.assertion_results =
                process_assertions(&results_file, case.assertion_stack_name.as_deref())?;
        }
        state.advance(RunnerPhase::AssertionCollected)
    }

    fn update_workflow_applies(&self, case_name: &str, case: &TestCase) -> bool {
        self.options.update_workflow
            && case.options.update_workflow_enabled()
            && self.unit.has_snapshot()
            && self
                .expected_suite()
                .is_some_and(|s| s.test_cases().contains_key(case_name))
    }

    /// Deploy the committed snapshot's stacks so the change is applied as
    /// an update
    async fn deploy_snapshot_code(&self, case_name: &str) -> IntegResult<()> {
        let Some(expected) = self.expected_suite() else {
            return Ok(());
        };
        let Some(expected_case) = expected.test_cases().get(case_name) else {
            return Ok(());
        };

        if !checkout_merge_base(self.working_dir(), self.unit.snapshot_dir()).await {
            self.events.warning(
                self.test_name(),
                format!(
                    "could not align {} with the merge base; deploying the snapshot as is",
                    self.unit.snapshot_dir().display()
                ),
            );
        }

        self.events.progress(
            self.test_name(),
            format!("{case_name}: deploying snapshot to validate the update"),
        );
        self.driver
            .deploy(DeployRequest {
                app: self.unit.snapshot_dir().display().to_string(),
                working_dir: self.working_dir().to_path_buf(),
                stacks: expected_case.stacks.clone(),
                context: self.snapshot_context(),
                output_dir: Some(self.scratch.path().to_path_buf()),
                outputs_file: None,
                rollback: true,
                lookups: expected.enable_lookups(),
                region: self.options.region.clone(),
                profile: self.options.profile.clone(),
            })
            .await?;
        Ok(())
    }

    async fn destroy_case(&self, case: &TestCase) -> IntegResult<()> {
        let mut stacks = case.stacks.clone();
        if let Some(assertion_stack) = &case.assertion_stack {
            stacks.push(assertion_stack.clone());
        }

        let result = self.destroy_stacks(case, &stacks).await;
        if result.is_err() {
            self.events.emit(
                self.test_name(),
                EventKind::DestroyReminder,
                format!(
                    "stacks may still be deployed, remove them with:\n  {}",
                    self.destroy_command(&stacks)
                ),
            );
        }
        classify(result, &case.options.expectation(CommandAction::Destroy))
    }

    async fn destroy_stacks(&self, case: &TestCase, stacks: &[String]) -> IntegResult<()> {
        let hooks = case.options.hooks();
        let hook_dir = self.hook_dir();
        run_hooks(&hooks.pre_destroy, &hook_dir).await?;
        self.driver
            .destroy(DestroyRequest {
                app: self.unit.app_command(),
                working_dir: self.working_dir().to_path_buf(),
                stacks: stacks.to_vec(),
                context: self.context(&self.prepared),
                output_dir: Some(self.scratch.path().to_path_buf()),
                region: self.options.region.clone(),
                profile: self.options.profile.clone(),
            })
            .await?;
        run_hooks(&hooks.post_destroy, &hook_dir).await
    }

    /// Hooks run next to the snapshot directory
    pub(super) fn hook_dir(&self) -> std::path::PathBuf {
        self.unit
            .snapshot_dir()
            .parent()
            .map_or_else(|| self.working_dir().to_path_buf(), Path::to_path_buf)
    }
}
