//! Deployment driver
//!
//! The runner never talks to the infrastructure backend directly; every
//! synth, deploy, destroy, list and watch goes through [`DeploymentDriver`].
//! [`CdkCliDriver`] implements it by shelling out to the app command and the
//! `cdk` CLI.

use crate::error::DriverError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

/// Context handed to the app on synth
pub type SynthContext = BTreeMap<String, Value>;

/// Synthesize an app into an output directory
#[derive(Debug, Clone, PartialEq)]
pub struct SynthRequest {
    /// Shell command running the app
    pub app: String,
    /// Working directory of the command
    pub working_dir: PathBuf,
    /// Assembly output directory
    pub output_dir: PathBuf,
    /// Extra environment
    pub env: BTreeMap<String, String>,
    /// Context passed through `CDK_CONTEXT_JSON`
    pub context: SynthContext,
}

/// Deploy stacks
#[derive(Debug, Clone, PartialEq)]
pub struct DeployRequest {
    /// App command or assembly directory
    pub app: String,
    /// Working directory of the command
    pub working_dir: PathBuf,
    /// Stacks to deploy
    pub stacks: Vec<String>,
    /// Context overrides
    pub context: SynthContext,
    /// Assembly output directory
    pub output_dir: Option<PathBuf>,
    /// File receiving stack outputs
    pub outputs_file: Option<PathBuf>,
    /// Roll back on failure
    pub rollback: bool,
    /// Allow environment lookups
    pub lookups: bool,
    /// Target region
    pub region: String,
    /// Credentials profile
    pub profile: Option<String>,
}

/// Destroy stacks
#[derive(Debug, Clone, PartialEq)]
pub struct DestroyRequest {
    /// App command or assembly directory
    pub app: String,
    /// Working directory of the command
    pub working_dir: PathBuf,
    /// Stacks to destroy
    pub stacks: Vec<String>,
    /// Context overrides
    pub context: SynthContext,
    /// Assembly output directory
    pub output_dir: Option<PathBuf>,
    /// Target region
    pub region: String,
    /// Credentials profile
    pub profile: Option<String>,
}

/// List the stacks an app defines
#[derive(Debug, Clone, PartialEq)]
pub struct ListRequest {
    /// App command or assembly directory
    pub app: String,
    /// Working directory of the command
    pub working_dir: PathBuf,
    /// Context overrides
    pub context: SynthContext,
    /// Assembly output directory
    pub output_dir: Option<PathBuf>,
    /// Credentials profile
    pub profile: Option<String>,
}

/// A line of output from a watch session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutput {
    /// Standard output line
    Stdout(String),
    /// Standard error line
    Stderr(String),
}

/// Running watch deployment
#[derive(Debug)]
pub struct WatchSession {
    /// Output lines
    pub output: mpsc::Receiver<WatchOutput>,
    /// Resolves with the exit code once the process ends
    pub exit: oneshot::Receiver<Option<i32>>,
}

/// Infrastructure backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeploymentDriver: Send + Sync {
    /// Synthesize the app into `request.output_dir`
    async fn synth(&self, request: SynthRequest) -> Result<(), DriverError>;

    /// Deploy stacks
    async fn deploy(&self, request: DeployRequest) -> Result<(), DriverError>;

    /// Destroy stacks
    async fn destroy(&self, request: DestroyRequest) -> Result<(), DriverError>;

    /// List stack names
    async fn list_stacks(&self, request: ListRequest) -> Result<Vec<String>, DriverError>;

    /// Deploy in watch mode
    async fn watch(&self, request: DeployRequest) -> Result<WatchSession, DriverError>;
}

/// Driver backed by the `cdk` CLI
#[derive(Debug, Clone)]
pub struct CdkCliDriver {
    cli: String,
}

impl Default for CdkCliDriver {
    fn default() -> Self {
        Self::new("cdk")
    }
}

impl CdkCliDriver {
    /// Create new driver invoking `cli`
    #[inline]
    #[must_use]
    pub fn new(cli: impl Into<String>) -> Self {
        Self { cli: cli.into() }
    }

    fn base_command(&self, verb: &str, app: &str, working_dir: &Path) -> Command {
        let mut command = Command::new(&self.cli);
        command
            .arg(verb)
            .arg("--app")
            .arg(app)
            .current_dir(working_dir)
            .stdin(Stdio::null());
        command
    }

    fn deploy_command(&self, request: &DeployRequest) -> Command {
        let mut command = self.base_command("deploy", &request.app, &request.working_dir);
        command.args(&request.stacks);
        command.args(["--require-approval", "never"]);
        if let Some(output) = &request.output_dir {
            command.arg("--output").arg(output);
        }
        if let Some(outputs_file) = &request.outputs_file {
            command.arg("--outputs-file").arg(outputs_file);
        }
        if !request.rollback {
            command.arg("--no-rollback");
        }
        command.arg(format!("--lookups={}", request.lookups));
        apply_context(&mut command, &request.context);
        apply_target(&mut command, &request.region, request.profile.as_deref());
        command
    }
}

fn apply_context(command: &mut Command, context: &SynthContext) {
    for (key, value) in context {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        command.arg("--context").arg(format!("{key}={value}"));
    }
}

fn apply_target(command: &mut Command, region: &str, profile: Option<&str>) {
    if let Some(profile) = profile {
        command.arg("--profile").arg(profile);
    }
    command
        .env("AWS_REGION", region)
        .env("AWS_DEFAULT_REGION", region)
        .env("CDK_DEFAULT_REGION", region);
}

async fn run(mut command: Command, program: &str) -> Result<std::process::Output, DriverError> {
    tracing::debug!(command = ?command.as_std(), "running");
    command
        .output()
        .await
        .map_err(|source| DriverError::Spawn {
            program: program.to_string(),
            source,
        })
}

fn failure_text(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let text = if stderr.trim().is_empty() { stdout } else { stderr };
    format!("exit status {}: {}", output.status, text.trim())
}

#[async_trait]
impl DeploymentDriver for CdkCliDriver {
    async fn synth(&self, request: SynthRequest) -> Result<(), DriverError> {
        let context_json = serde_json::to_string(&request.context).map_err(|e| {
            DriverError::SynthFailed {
                message: format!("cannot encode context: {e}"),
            }
        })?;
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&request.app)
            .current_dir(&request.working_dir)
            .envs(&request.env)
            .env("CDK_OUTDIR", &request.output_dir)
            .env("CDK_CONTEXT_JSON", context_json)
            .stdin(Stdio::null());

        let output = run(command, "sh").await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(DriverError::SynthFailed {
                message: failure_text(&output),
            })
        }
    }

    async fn deploy(&self, request: DeployRequest) -> Result<(), DriverError> {
        let output = run(self.deploy_command(&request), &self.cli).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(DriverError::DeployFailed {
                message: failure_text(&output),
            })
        }
    }

    async fn destroy(&self, request: DestroyRequest) -> Result<(), DriverError> {
        let mut command = self.base_command("destroy", &request.app, &request.working_dir);
        command.args(&request.stacks).arg("--force");
        if let Some(output) = &request.output_dir {
            command.arg("--output").arg(output);
        }
        apply_context(&mut command, &request.context);
        apply_target(&mut command, &request.region, request.profile.as_deref());

        let output = run(command, &self.cli).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(DriverError::DestroyFailed {
                message: failure_text(&output),
            })
        }
    }

    async fn list_stacks(&self, request: ListRequest) -> Result<Vec<String>, DriverError> {
        let mut command = self.base_command("list", &request.app, &request.working_dir);
        command.arg("--all");
        if let Some(output) = &request.output_dir {
            command.arg("--output").arg(output);
        }
        if let Some(profile) = &request.profile {
            command.arg("--profile").arg(profile);
        }
        apply_context(&mut command, &request.context);

        let output = run(command, &self.cli).await?;
        if !output.status.success() {
            return Err(DriverError::ListFailed {
                message: failure_text(&output),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn watch(&self, request: DeployRequest) -> Result<WatchSession, DriverError> {
        let mut command = self.deploy_command(&request);
        command
            .arg("--watch")
            .arg("--hotswap-fallback")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| DriverError::Spawn {
            program: self.cli.clone(),
            source,
        })?;
        let (tx, output) = mpsc::channel(256);
        let (exit_tx, exit) = oneshot::channel();

        if let Some(stdout) = child.stdout.take() {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(WatchOutput::Stdout(line)).await.is_err() {
                        break;
                    }
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(WatchOutput::Stderr(line)).await.is_err() {
                        break;
                    }
                }
            });
        }
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!(error = %e, "watch process wait failed");
                    None
                }
            };
            let _ = exit_tx.send(code);
        });

        Ok(WatchSession { output, exit })
    }
}
