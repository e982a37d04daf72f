//! Error types for the runner
//!
//! [`DriverError`] covers failures of the deployment backend;
//! [`IntegError`] is the runner-level error every step returns.

use integ_assembly::ManifestError;
use integ_diff::DiagnosticReason;
use integ_suite::SuiteError;
use std::path::PathBuf;

/// Failures reported by a deployment driver
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Synth exited non-zero
    #[error("synth failed: {message}")]
    SynthFailed { message: String },

    /// Deploy exited non-zero
    #[error("deploy failed: {message}")]
    DeployFailed { message: String },

    /// Destroy exited non-zero
    #[error("destroy failed: {message}")]
    DestroyFailed { message: String },

    /// Listing stacks failed
    #[error("list stacks failed: {message}")]
    ListFailed { message: String },

    /// Watch could not be started
    #[error("watch failed: {message}")]
    WatchFailed { message: String },

    /// The backend process could not be spawned
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl DriverError {
    /// Raw failure text reported by the backend
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::SynthFailed { message }
            | Self::DeployFailed { message }
            | Self::DestroyFailed { message }
            | Self::ListFailed { message }
            | Self::WatchFailed { message } => message.clone(),
            Self::Spawn { source, .. } => source.to_string(),
        }
    }
}

/// Runner error
#[derive(Debug, thiserror::Error)]
pub enum IntegError {
    /// Deployment driver failure
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Assembly manifest failure
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Test suite failure
    #[error(transparent)]
    Suite(#[from] SuiteError),

    /// Legacy test without a committed snapshot
    #[error("{test} is a new test; declare it with an IntegTest construct (integ.json) instead of a legacy directive")]
    LegacyWithoutSnapshot { test: String },

    /// The unit declares no test cases
    #[error("no tests defined for {test}")]
    NoTestCases { test: String },

    /// Unknown test case name
    #[error("test case '{case}' not found in {test}")]
    UnknownTestCase { test: String, case: String },

    /// A hook command failed
    #[error("hook '{command}' failed: {message}")]
    Hook { command: String, message: String },

    /// Illegal runner phase transition
    #[error("illegal runner transition {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// File watching failed
    #[error("watch error: {0}")]
    Watch(String),

    /// IO error on a path
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntegError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error came from the deployment backend or a hook
    #[inline]
    #[must_use]
    pub fn is_driver_failure(&self) -> bool {
        matches!(self, Self::Driver(_) | Self::Hook { .. })
    }

    /// Reason an integration worker reports for this error
    #[must_use]
    pub fn reason(&self) -> DiagnosticReason {
        if self.is_driver_failure() {
            DiagnosticReason::TestFailed
        } else {
            DiagnosticReason::TestError
        }
    }
}

/// Result alias for runner operations
pub type IntegResult<T> = Result<T, IntegError>;
