//! Watch mode
//!
//! Deploys one test case continuously. Every time the deploy rewrites the
//! assertion results file the assertions are read again and reported. Watch
//! mode never compares or writes snapshots and never destroys.

use super::IntegRunner;
use crate::assertions::{any_failed, process_assertions, AssertionResults, ASSERTION_RESULTS_FILE};
use crate::driver::{DeployRequest, WatchOutput};
use crate::error::{IntegError, IntegResult};
use crate::events::EventKind;
use crate::hooks::run_hooks;
use notify::{Event, EventKind as FsEventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::time::Instant;
use tokio::sync::mpsc;

/// How a watch session ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOutcome {
    /// Exit code of the deploy process
    pub exit_code: Option<i32>,
    /// Number of times assertions were evaluated
    pub assertion_runs: usize,
}

fn build_watcher(
    tx: mpsc::UnboundedSender<notify::Result<Event>>,
) -> IntegResult<RecommendedWatcher> {
    notify::recommended_watcher(move |event| {
        if tx.send(event).is_err() {
            tracing::debug!("watch event dropped because the session ended");
        }
    })
    .map_err(|e| IntegError::Watch(e.to_string()))
}

fn touches_results(event: &Event) -> bool {
    matches!(event.kind, FsEventKind::Create(_) | FsEventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some_and(|n| n == ASSERTION_RESULTS_FILE))
}

/// Human text for one round of assertion results
#[must_use]
pub fn describe_results(results: &AssertionResults, elapsed_secs: f64) -> String {
    if any_failed(results) {
        let failures: Vec<String> = results
            .iter()
            .filter(|(_, r)| r.status == crate::assertions::AssertionStatus::Fail)
            .map(|(id, r)| format!("  {id}: {}", r.message.as_deref().unwrap_or("failed")))
            .collect();
        format!("assertion failed ({elapsed_secs:.2}s)\n{}", failures.join("\n"))
    } else {
        format!("test succeeded ({elapsed_secs:.2}s)")
    }
}

impl IntegRunner {
    /// Deploy `case_name` in watch mode until the deploy process exits
    ///
    /// # Errors
    /// - `UnknownTestCase` if the actual suite has no such case
    /// - `Watch` if the output directory cannot be watched
    /// - hook and driver errors starting the session
    pub async fn watch(&mut self, case_name: &str) -> IntegResult<WatchOutcome> {
        let case = self
            .actual_suite()
            .test_cases()
            .get(case_name)
            .cloned()
            .ok_or_else(|| IntegError::UnknownTestCase {
                test: self.test_name().to_string(),
                case: case_name.to_string(),
            })?;

        let mut stacks = case.stacks.clone();
        if let Some(assertion_stack) = &case.assertion_stack {
            stacks.push(assertion_stack.clone());
        }
        run_hooks(&case.options.hooks().pre_deploy, &self.hook_dir()).await?;

        let output_dir = self.scratch.path().to_path_buf();
        std::fs::create_dir_all(&output_dir).map_err(|e| IntegError::io_error(&output_dir, e))?;
        let results_file = output_dir.join(ASSERTION_RESULTS_FILE);

        let (fs_tx, mut fs_rx) = mpsc::unbounded_channel();
        let mut watcher = build_watcher(fs_tx)?;
        watcher
            .watch(&output_dir, RecursiveMode::NonRecursive)
            .map_err(|e| IntegError::Watch(e.to_string()))?;

        let mut session = self
            .driver
            .watch(DeployRequest {
                app: self.unit.app_command(),
                working_dir: self.working_dir().to_path_buf(),
                stacks: stacks.clone(),
                context: self.context(&self.prepared),
                output_dir: Some(output_dir.clone()),
                outputs_file: case.assertion_stack.as_ref().map(|_| results_file.clone()),
                rollback: false,
                lookups: self.actual_suite().enable_lookups(),
                region: self.options.region.clone(),
                profile: self.options.profile.clone(),
            })
            .await?;

        let mut outcome = WatchOutcome::default();
        let mut last_trigger = Instant::now();
        let mut output_open = true;
        loop {
            tokio::select! {
                line = session.output.recv(), if output_open => match line {
                    Some(WatchOutput::Stdout(line)) => tracing::info!(test = %self.test_name(), "{line}"),
                    Some(WatchOutput::Stderr(line)) => tracing::debug!(test = %self.test_name(), "{line}"),
                    None => output_open = false,
                },
                event = fs_rx.recv() => match event {
                    Some(Ok(event)) if touches_results(&event) => {
                        let elapsed = last_trigger.elapsed().as_secs_f64();
                        last_trigger = Instant::now();
                        if self.report_assertions(&results_file, case.assertion_stack_name.as_deref(), elapsed, &stacks) {
                            outcome.assertion_runs += 1;
                        }
                    }
                    Some(Ok(_)) | None => {}
                    Some(Err(e)) => tracing::warn!(error = %e, "watch backend error"),
                },
                code = &mut session.exit => {
                    outcome.exit_code = code.ok().flatten();
                    // results written just before exit may still be queued or undelivered
                    let mut pending = false;
                    while let Ok(event) = fs_rx.try_recv() {
                        match event {
                            Ok(event) => pending |= touches_results(&event),
                            Err(e) => tracing::warn!(error = %e, "watch backend error"),
                        }
                    }
                    if pending || results_file.exists() {
                        let elapsed = last_trigger.elapsed().as_secs_f64();
                        if self.report_assertions(&results_file, case.assertion_stack_name.as_deref(), elapsed, &stacks) {
                            outcome.assertion_runs += 1;
                        }
                    }
                    break;
                }
            }
        }

        drop(watcher);
        self.scratch.clear();
        tracing::info!(test = %self.test_name(), exit_code = ?outcome.exit_code, "watch ended");
        Ok(outcome)
    }

    fn report_assertions(
        &self,
        results_file: &Path,
        assertion_stack: Option<&str>,
        elapsed_secs: f64,
        stacks: &[String],
    ) -> bool {
        let results = match process_assertions(results_file, assertion_stack) {
            Ok(Some(results)) => results,
            Ok(None) => return false,
            Err(e) => {
                self.events.warning(self.test_name(), format!("could not read assertion results: {e}"));
                return false;
            }
        };

        self.events.emit(
            self.test_name(),
            EventKind::AssertionNotification,
            describe_results(&results, elapsed_secs),
        );
        self.events.emit(
            self.test_name(),
            EventKind::DestroyReminder,
            format!(
                "watch mode never destroys; remove the stacks with:\n  {}",
                self.destroy_command(stacks)
            ),
        );
        if self.options.verbosity > 0 {
            self.events.emit(self.test_name(), EventKind::Repro, self.repro_command());
        }
        true
    }
}
