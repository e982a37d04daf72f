//! Diagnostics reported per test unit

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

/// Outcome code of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticReason {
    /// Integration test passed
    TestSuccess,
    /// Integration test failed
    TestFailed,
    /// Integration test raised unexpectedly
    TestError,
    /// An assertion reported `fail`
    AssertionFailed,
    /// Snapshot matched
    SnapshotSuccess,
    /// Snapshot differed
    SnapshotFailed,
    /// Snapshot test raised unexpectedly
    SnapshotError,
    /// No committed snapshot
    NoSnapshot,
    /// Destructive changes were detected
    DestructiveChanges,
}

impl DiagnosticReason {
    /// Wire name of the reason
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TestSuccess => "TEST_SUCCESS",
            Self::TestFailed => "TEST_FAILED",
            Self::TestError => "TEST_ERROR",
            Self::AssertionFailed => "ASSERTION_FAILED",
            Self::SnapshotSuccess => "SNAPSHOT_SUCCESS",
            Self::SnapshotFailed => "SNAPSHOT_FAILED",
            Self::SnapshotError => "SNAPSHOT_ERROR",
            Self::NoSnapshot => "NO_SNAPSHOT",
            Self::DestructiveChanges => "DESTRUCTIVE_CHANGES",
        }
    }

    /// Whether this reason fails the run
    #[must_use]
    pub fn is_failure(self) -> bool {
        !matches!(self, Self::TestSuccess | Self::SnapshotSuccess)
    }
}

impl Display for DiagnosticReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings the diff was computed with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffConfig {
    /// Asset hashes were compared verbatim
    pub diff_assets: bool,
}

/// One reported finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Normalized test name
    pub test_name: String,
    /// Stack or template id
    pub stack_name: String,
    /// Outcome code
    pub reason: DiagnosticReason,
    /// Human readable message
    pub message: String,
    /// Diff settings, for snapshot diffs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<DiffConfig>,
    /// Extra lines (repro commands, retained paths)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_messages: Vec<String>,
    /// Elapsed time, for successes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
}

impl Diagnostic {
    /// Create new diagnostic
    #[must_use]
    pub fn new(
        test_name: impl Into<String>,
        stack_name: impl Into<String>,
        reason: DiagnosticReason,
        message: impl Into<String>,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            stack_name: stack_name.into(),
            reason,
            message: message.into(),
            config: None,
            additional_messages: Vec::new(),
            duration: None,
        }
    }

    /// Attach diff settings
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: DiffConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Append an extra message line
    #[inline]
    #[must_use]
    pub fn with_additional_message(mut self, message: impl Into<String>) -> Self {
        self.additional_messages.push(message.into());
        self
    }

    /// Attach elapsed time
    #[inline]
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Whether this diagnostic fails the run
    #[inline]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.reason.is_failure()
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.reason, self.test_name, self.stack_name)?;
        if !self.message.is_empty() {
            write!(f, "\n{}", self.message)?;
        }
        for extra in &self.additional_messages {
            write!(f, "\n{extra}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_wire_names() {
        let json = serde_json::to_string(&DiagnosticReason::DestructiveChanges).unwrap();
        assert_eq!(json, "\"DESTRUCTIVE_CHANGES\"");
        assert_eq!(DiagnosticReason::NoSnapshot.to_string(), "NO_SNAPSHOT");
    }

    #[test]
    fn success_reasons_do_not_fail() {
        assert!(!DiagnosticReason::TestSuccess.is_failure());
        assert!(!DiagnosticReason::SnapshotSuccess.is_failure());
        assert!(DiagnosticReason::SnapshotFailed.is_failure());
        assert!(DiagnosticReason::AssertionFailed.is_failure());
    }

    #[test]
    fn display_includes_extra_lines() {
        let d = Diagnostic::new("integ.a", "StackA", DiagnosticReason::SnapshotFailed, "diff")
            .with_additional_message("repro: cdk synth");
        assert_eq!(
            d.to_string(),
            "[SNAPSHOT_FAILED] integ.a (StackA)\ndiff\nrepro: cdk synth"
        );
    }
}
