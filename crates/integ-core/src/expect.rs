//! Expected-error classification for deploy and destroy
//!
//! One attempt is authoritative: an error either matches the declared
//! expectation and is swallowed, or it propagates.

use crate::error::{IntegError, IntegResult};
use integ_suite::ErrorExpectation;
use regex::Regex;

/// Whether `message` satisfies `pattern`
///
/// The pattern is a regular expression; a pattern that does not compile is
/// matched as a plain substring.
#[must_use]
pub fn message_matches(pattern: &str, message: &str) -> bool {
    match Regex::new(pattern) {
        Ok(re) => re.is_match(message),
        Err(e) => {
            tracing::debug!(%pattern, error = %e, "expected message is not a regex, matching literally");
            message.contains(pattern)
        }
    }
}

/// Text an expected-message pattern is matched against
///
/// Backend failures match on the raw text the backend reported, without
/// the runner's own prefix.
fn failure_text(error: &IntegError) -> String {
    match error {
        IntegError::Driver(driver) => driver.message(),
        other => other.to_string(),
    }
}

/// Swallow `error` if `expectation` declares it, else return it
///
/// # Errors
/// Returns `error` unchanged when it is not expected
pub fn classify_error(error: IntegError, expectation: &ErrorExpectation) -> IntegResult<()> {
    if !expectation.expect_error {
        return Err(error);
    }
    let Some(pattern) = &expectation.expected_message else {
        tracing::info!(error = %error, "swallowing expected error");
        return Ok(());
    };
    if message_matches(pattern, &failure_text(&error)) {
        tracing::info!(error = %error, %pattern, "swallowing expected error");
        Ok(())
    } else {
        Err(error)
    }
}

/// Apply [`classify_error`] to the error of `result`
///
/// # Errors
/// Returns the error of `result` when it is not expected
pub fn classify<T>(result: IntegResult<T>, expectation: &ErrorExpectation) -> IntegResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(error) => classify_error(error, expectation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;

    fn deploy_error(message: &str) -> IntegError {
        DriverError::DeployFailed {
            message: message.to_string(),
        }
        .into()
    }

    #[test]
    fn unexpected_errors_propagate() {
        let expectation = ErrorExpectation {
            expect_error: false,
            expected_message: Some("boom".to_string()),
        };
        assert!(classify_error(deploy_error("boom"), &expectation).is_err());
    }

    #[test]
    fn any_error_swallowed_without_pattern() {
        assert!(classify_error(deploy_error("anything"), &ErrorExpectation::any()).is_ok());
    }

    #[test]
    fn pattern_must_match() {
        let expectation = ErrorExpectation::matching("Bucket.*already exists");
        assert!(classify_error(deploy_error("Bucket foo already exists"), &expectation).is_ok());
        assert!(classify_error(deploy_error("access denied"), &expectation).is_err());
    }

    #[test]
    fn anchored_pattern_matches_backend_text() {
        let expectation = ErrorExpectation::matching("^Resource quota");
        assert!(classify_error(deploy_error("Resource quota exceeded"), &expectation).is_ok());
        assert!(classify_error(deploy_error("quota: Resource quota exceeded"), &expectation).is_err());
    }

    #[test]
    fn hook_errors_match_their_display() {
        let error = IntegError::Hook {
            command: "./seed.sh".to_string(),
            message: "exit status 3".to_string(),
        };
        assert!(classify_error(error, &ErrorExpectation::matching("exit status 3")).is_ok());
    }

    #[test]
    fn invalid_regex_falls_back_to_substring() {
        assert!(message_matches("rate (exceeded", "rate (exceeded for api"));
        assert!(!message_matches("rate (exceeded", "throttled"));
    }

    #[test]
    fn classify_passes_success_through() {
        assert!(classify(Ok::<_, IntegError>(5), &ErrorExpectation::default()).is_ok());
    }
}
