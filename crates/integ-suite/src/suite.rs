//! Test suite model
//!
//! A [`TestSuite`] is either declared by an `integ.json` file or inferred
//! from a legacy directive in the test source. Both variants share the same
//! accessors.

use crate::case::{TestCase, TestOptions};
use crate::error::{SuiteError, SuiteResult};
use crate::legacy::LegacySuite;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// File name of the test manifest
pub const INTEG_MANIFEST_FILE: &str = "integ.json";

/// Schema version written into new test manifests
pub const INTEG_MANIFEST_VERSION: &str = "36.0.0";

/// On-disk test manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegManifest {
    /// Schema version
    pub version: String,
    /// Test cases by name
    pub test_cases: IndexMap<String, TestCase>,
    /// Whether synth needs environment lookups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_lookups: Option<bool>,
    /// Context passed to every synth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synth_context: Option<BTreeMap<String, String>>,
}

impl IntegManifest {
    /// Read `integ.json` from `directory`
    ///
    /// # Errors
    /// `ManifestRead` if the file cannot be read, `ManifestParse` if invalid
    pub fn load(directory: impl AsRef<Path>) -> SuiteResult<Self> {
        let path = directory.as_ref().join(INTEG_MANIFEST_FILE);
        let text = fs::read_to_string(&path).map_err(|source| SuiteError::ManifestRead {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| SuiteError::ManifestParse {
            path,
            message: e.to_string(),
        })
    }

    /// Write `integ.json` into `directory`
    ///
    /// # Errors
    /// Fails on serialization or IO errors
    pub fn save(&self, directory: impl AsRef<Path>) -> SuiteResult<()> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory).map_err(|e| SuiteError::io_error(directory, e))?;
        let path = directory.join(INTEG_MANIFEST_FILE);
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        fs::write(&path, text).map_err(|e| SuiteError::io_error(path, e))
    }
}

/// Suite declared by an `integ.json`
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestSuite {
    test_cases: IndexMap<String, TestCase>,
    enable_lookups: bool,
    synth_context: Option<BTreeMap<String, String>>,
}

impl From<IntegManifest> for ManifestSuite {
    fn from(manifest: IntegManifest) -> Self {
        Self {
            test_cases: manifest.test_cases,
            enable_lookups: manifest.enable_lookups.unwrap_or(false),
            synth_context: manifest.synth_context,
        }
    }
}

/// Test suite of one unit
#[derive(Debug, Clone, PartialEq)]
pub enum TestSuite {
    /// Declared by `integ.json`
    Manifest(ManifestSuite),
    /// Inferred from a legacy directive
    Legacy(LegacySuite),
}

impl TestSuite {
    /// Load a declared suite from `directory`
    ///
    /// # Errors
    /// Any read or parse failure; callers fall back to legacy inference
    pub fn from_manifest_dir(directory: impl AsRef<Path>) -> SuiteResult<Self> {
        IntegManifest::load(directory).map(|m| Self::Manifest(m.into()))
    }

    /// Build a declared suite from test cases
    #[must_use]
    pub fn declared(test_cases: IndexMap<String, TestCase>) -> Self {
        Self::Manifest(ManifestSuite {
            test_cases,
            enable_lookups: false,
            synth_context: None,
        })
    }

    /// Test cases by name
    #[must_use]
    pub fn test_cases(&self) -> &IndexMap<String, TestCase> {
        match self {
            Self::Manifest(s) => &s.test_cases,
            Self::Legacy(s) => s.test_cases(),
        }
    }

    /// Whether synth needs environment lookups
    #[must_use]
    pub fn enable_lookups(&self) -> bool {
        match self {
            Self::Manifest(s) => s.enable_lookups,
            Self::Legacy(s) => s.enable_lookups(),
        }
    }

    /// Context declared for synth
    #[must_use]
    pub fn synth_context(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Manifest(s) => s.synth_context.as_ref(),
            Self::Legacy(_) => None,
        }
    }

    /// Whether this suite was inferred from a legacy directive
    #[inline]
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }

    /// Context discovered from legacy pragmas
    #[must_use]
    pub fn legacy_context(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Manifest(_) => None,
            Self::Legacy(s) => Some(s.context()),
        }
    }

    /// Every stack named by any test case
    #[must_use]
    pub fn stacks(&self) -> BTreeSet<String> {
        self.test_cases()
            .values()
            .flat_map(|c| c.stacks.iter().cloned())
            .collect()
    }

    /// Stacks of cases that disabled the update workflow
    #[must_use]
    pub fn stacks_without_update_workflow(&self) -> BTreeSet<String> {
        self.test_cases()
            .values()
            .filter(|c| !c.options.update_workflow_enabled())
            .flat_map(|c| c.stacks.iter().cloned())
            .collect()
    }

    /// Options of the first test case containing `stack`
    #[must_use]
    pub fn options_for_stack(&self, stack: &str) -> Option<&TestOptions> {
        self.test_cases()
            .values()
            .find(|c| c.contains_stack(stack))
            .map(|c| &c.options)
    }

    /// Manifest form of this suite
    #[must_use]
    pub fn to_manifest(&self) -> IntegManifest {
        IntegManifest {
            version: INTEG_MANIFEST_VERSION.to_string(),
            test_cases: self.test_cases().clone(),
            enable_lookups: Some(self.enable_lookups()),
            synth_context: self.synth_context().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_manifest(dir: &Path, value: &serde_json::Value) {
        fs::write(dir.join(INTEG_MANIFEST_FILE), value.to_string()).unwrap();
    }

    #[test]
    fn loads_declared_suite() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            &json!({
                "version": "36.0.0",
                "testCases": {
                    "Case1": {"stacks": ["A", "B"]},
                    "Case2": {"stacks": ["C"], "stackUpdateWorkflow": false, "diffAssets": true}
                },
                "enableLookups": true,
                "synthContext": {"@aws-cdk/core:newStyleStackSynthesis": "true"}
            }),
        );
        let suite = TestSuite::from_manifest_dir(dir.path()).unwrap();
        assert!(!suite.is_legacy());
        assert!(suite.enable_lookups());
        assert_eq!(suite.stacks().len(), 3);
        assert_eq!(
            suite.stacks_without_update_workflow(),
            BTreeSet::from(["C".to_string()])
        );
        assert!(suite.options_for_stack("C").unwrap().diff_assets());
        assert!(!suite.options_for_stack("A").unwrap().diff_assets());
        assert!(suite.options_for_stack("Z").is_none());
        assert_eq!(suite.synth_context().unwrap().len(), 1);
    }

    #[test]
    fn missing_or_invalid_manifest_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            TestSuite::from_manifest_dir(dir.path()),
            Err(SuiteError::ManifestRead { .. })
        ));
        write_manifest(dir.path(), &json!({"version": "1"}));
        assert!(matches!(
            TestSuite::from_manifest_dir(dir.path()),
            Err(SuiteError::ManifestParse { .. })
        ));
    }

    #[test]
    fn manifest_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let mut cases = IndexMap::new();
        cases.insert("only".to_string(), TestCase::new(["StackA"]));
        let suite = TestSuite::declared(cases);
        suite.to_manifest().save(dir.path()).unwrap();

        let reloaded = TestSuite::from_manifest_dir(dir.path()).unwrap();
        assert_eq!(reloaded.test_cases(), suite.test_cases());
    }
}
