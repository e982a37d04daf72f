//! Integ Core - snapshot and integration test runner
//!
//! Runs infrastructure test units: compares a fresh synth of every unit
//! with its committed snapshot, and on request deploys, validates and
//! destroys the unit's stacks before rewriting the snapshot.
//!
//! # Core Concepts
//!
//! - **DeploymentDriver**: backend performing synth, deploy, destroy, list and watch
//! - **IntegRunner**: lifecycle of one unit, threaded through a [`RunnerState`]
//! - **WorkerPool**: one worker per execution context draining a shared queue
//! - **Orchestrator**: snapshot phase, then the integration phase
//! - **EventSink**: advisory progress stream, separate from results
//!
//! # Example
//!
//! ```rust,ignore
//! use integ_core::{CdkCliDriver, EventSink, Orchestrator, RunnerConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunnerConfig::load("integ.toml")?;
//! let units = integ_suite::discover(&config.directory, &config.discovery_options()?)?;
//! let orchestrator = Orchestrator::new(Arc::new(CdkCliDriver::default()), config, EventSink::disabled());
//! let summary = orchestrator.run(units).await;
//! std::process::exit(summary.exit_code());
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod assertions;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod events;
pub mod expect;
pub mod git;
pub mod hooks;
pub mod orchestrator;
pub mod pool;
pub mod runner;
pub mod state;
pub mod summary;
pub mod worker;

pub use assertions::{AssertionResult, AssertionResults, AssertionStatus};
pub use config::{CliOverrides, RunnerConfig};
pub use driver::{
    CdkCliDriver, DeployRequest, DeploymentDriver, DestroyRequest, ListRequest, SynthRequest,
    WatchOutput, WatchSession,
};
pub use error::{DriverError, IntegError, IntegResult};
pub use events::{spawn_event_logger, EventKind, EventSink, RunnerEvent};
pub use expect::classify_error;
pub use orchestrator::Orchestrator;
pub use pool::{ContextMetrics, ExecutionContext, PoolReport, WorkerId, WorkerPool};
pub use runner::{IntegRunner, RunnerOptions, WatchOutcome};
pub use state::{RunnerPhase, RunnerState};
pub use summary::RunSummary;
pub use worker::{IntegOutcome, JobSettings, SnapshotOutcome};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
