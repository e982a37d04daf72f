//! Error types for the manifest reader
//!
//! `ManifestNotFound` is deliberately distinct from the other variants: the
//! test suite model treats it as "this directory holds no declared manifest"
//! and falls back to legacy inference.

use std::path::PathBuf;

/// Errors while reading or rewriting a cloud assembly directory
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest file is missing or could not be parsed
    #[error("manifest not found at {path}: {reason}")]
    ManifestNotFound { path: PathBuf, reason: String },

    /// A referenced artifact id is not declared in the manifest
    #[error("artifact not found in manifest: {0}")]
    ArtifactNotFound(String),

    /// An artifact exists but is not shaped as expected
    #[error("invalid artifact '{id}': {message}")]
    InvalidArtifact { id: String, message: String },

    /// A file referenced by the manifest could not be parsed
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// IO error on a path inside the assembly
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization failed while writing the manifest back
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ManifestError {
    /// Create manifest-not-found error for path
    pub fn not_found(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ManifestNotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create parse error for path
    pub fn parse_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error means "no manifest here"
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ManifestNotFound { .. })
    }
}

/// Result alias for manifest operations
pub type ManifestResult<T> = Result<T, ManifestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = ManifestError::not_found("/tmp/x/manifest.json", "missing");
        assert_eq!(err.to_string(), "manifest not found at /tmp/x/manifest.json: missing");
        assert!(err.is_not_found());
    }

    #[test]
    fn other_errors_are_not_not_found() {
        let err = ManifestError::ArtifactNotFound("StackA".to_string());
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("StackA"));
    }
}
