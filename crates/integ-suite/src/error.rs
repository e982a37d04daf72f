//! Error types for discovery and suite loading

use std::path::PathBuf;

/// Errors while discovering test units or loading their suites
#[derive(Debug, thiserror::Error)]
pub enum SuiteError {
    /// `integ.json` could not be read
    #[error("failed to read test manifest {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `integ.json` is not a valid test manifest
    #[error("invalid test manifest {path}: {message}")]
    ManifestParse { path: PathBuf, message: String },

    /// Legacy inference found no stacks in the app
    #[error("test '{test}' defines no stacks")]
    NoStacks { test: String },

    /// Legacy inference found several stacks and no directive
    #[error(
        "test '{test}' defines {} stacks ({}); add a '!cdk-integ <stack>' directive or an integ.json",
        .stacks.len(),
        .stacks.join(", ")
    )]
    AmbiguousStacks { test: String, stacks: Vec<String> },

    /// A directive names a stack the app does not define
    #[error("test '{test}' selects unknown stack '{stack}'")]
    UnknownStack { test: String, stack: String },

    /// A test file pattern is not a valid regex
    #[error("invalid test pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Unknown language preset name
    #[error("unknown language '{0}'")]
    UnknownLanguage(String),

    /// Requested test names matched no discovered unit
    #[error("no test units match: {}", .0.join(", "))]
    NoMatchingTests(Vec<String>),

    /// IO error during discovery or manifest writing
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest serialization failed
    #[error("failed to serialize test manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl SuiteError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for suite operations
pub type SuiteResult<T> = Result<T, SuiteError>;
