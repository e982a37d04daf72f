//! Assertion results artifact
//!
//! An assertion stack reports each assertion as a stack output whose key
//! starts with [`ASSERTION_OUTPUT_PREFIX`] and whose value is a JSON string
//! `{"status": "success" | "fail", "message": ...}`.

use crate::error::{IntegError, IntegResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Output key prefix marking an assertion result
pub const ASSERTION_OUTPUT_PREFIX: &str = "AssertionResults";

/// Outputs file written by the assertion stack deploy
pub const ASSERTION_RESULTS_FILE: &str = "assertion-results.json";

/// Assertion outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionStatus {
    /// Assertion held
    Success,
    /// Assertion failed
    Fail,
}

/// One assertion outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionResult {
    /// Outcome
    pub status: AssertionStatus,
    /// Failure text
    #[serde(default)]
    pub message: Option<String>,
}

impl AssertionResult {
    fn fail(message: impl Into<String>) -> Self {
        Self {
            status: AssertionStatus::Fail,
            message: Some(message.into()),
        }
    }
}

/// Outcomes keyed by assertion id
pub type AssertionResults = BTreeMap<String, AssertionResult>;

/// Whether any assertion failed
#[must_use]
pub fn any_failed(results: &AssertionResults) -> bool {
    results.values().any(|r| r.status == AssertionStatus::Fail)
}

/// One line per assertion, failures followed by their message
#[must_use]
pub fn format_assertion_results(results: &AssertionResults) -> String {
    results
        .iter()
        .map(|(id, result)| match result.status {
            AssertionStatus::Success => format!("{id} - success"),
            AssertionStatus::Fail => format!(
                "{id} - failed\n{}",
                result.message.as_deref().unwrap_or_default()
            ),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read assertion results from `path`, then delete the file
///
/// Only the outputs of `assertion_stack` are read when given, otherwise
/// every stack in the file. An entry that is not a valid result, or a file
/// that cannot be parsed, becomes a `fail` result. Returns `None` when the
/// file is absent or holds no assertion outputs.
///
/// # Errors
/// IO errors other than "not found"
pub fn process_assertions(
    path: &Path,
    assertion_stack: Option<&str>,
) -> IntegResult<Option<AssertionResults>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(IntegError::io_error(path, e)),
    };

    let results = parse_results(&text, assertion_stack);
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove assertion results");
    }
    Ok((!results.is_empty()).then_some(results))
}

fn parse_results(text: &str, assertion_stack: Option<&str>) -> AssertionResults {
    let mut results = AssertionResults::new();
    let outputs: BTreeMap<String, BTreeMap<String, Value>> = match serde_json::from_str(text) {
        Ok(outputs) => outputs,
        Err(e) => {
            results.insert(
                "deploy".to_string(),
                AssertionResult::fail(format!("Error parsing assertion results: {e}")),
            );
            return results;
        }
    };

    let stacks = outputs
        .iter()
        .filter(|(stack, _)| assertion_stack.map_or(true, |s| s == stack.as_str()));
    for (_, stack_outputs) in stacks {
        for (key, value) in stack_outputs {
            if !key.starts_with(ASSERTION_OUTPUT_PREFIX) {
                continue;
            }
            let result = value
                .as_str()
                .ok_or_else(|| "assertion output is not a string".to_string())
                .and_then(|raw| {
                    serde_json::from_str::<AssertionResult>(raw).map_err(|e| e.to_string())
                })
                .unwrap_or_else(|reason| {
                    AssertionResult::fail(format!("malformed assertion result: {reason}"))
                });
            results.insert(key.clone(), result);
        }
    }
    results
}
