//! Legacy test inference
//!
//! Tests written before `integ.json` existed select their stacks with a
//! directive comment in the test source:
//!
//! ```text
//! /// !cdk-integ StackA pragma:enable-lookups pragma:set-context:@aws-cdk/core:foo=bar
//! ```
//!
//! Plain words select stacks (`*` selects every stack the app defines).
//! Words prefixed with `pragma:` are either `key=value` context overrides or
//! one of the flag pragmas.

use crate::case::{TestCase, TestOptions};
use crate::error::{SuiteError, SuiteResult};
use crate::suite::{IntegManifest, INTEG_MANIFEST_VERSION};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::path::Path;

/// Marker introducing a legacy directive
pub const DIRECTIVE_MARKER: &str = "!cdk-integ";

/// Prefix of pragma words
pub const PRAGMA_PREFIX: &str = "pragma:";

/// Optional prefix of context pragmas after `pragma:`
pub const SET_CONTEXT_PREFIX: &str = "set-context:";

/// Stack selection word meaning "every stack"
pub const ALL_STACKS: &str = "*";

const ENABLE_LOOKUPS: &str = "enable-lookups";
const DISABLE_UPDATE_WORKFLOW: &str = "disable-update-workflow";
const INCLUDE_ASSETS_HASHES: &str = "include-assets-hashes";

/// Parsed directive line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyDirective {
    /// Explicit stack selections, in order
    pub stacks: Vec<String>,
    /// Context overrides from `pragma:key=value`
    pub context: BTreeMap<String, String>,
    /// `pragma:enable-lookups`
    pub enable_lookups: bool,
    /// `pragma:disable-update-workflow`
    pub disable_update_workflow: bool,
    /// `pragma:include-assets-hashes`
    pub include_assets_hashes: bool,
}

impl LegacyDirective {
    /// Parse the first directive line of `source`, if any
    #[must_use]
    pub fn parse(source: &str) -> Option<Self> {
        let line = source.lines().find(|l| l.contains(DIRECTIVE_MARKER))?;
        let (_, rest) = line.split_once(DIRECTIVE_MARKER)?;

        let mut directive = Self::default();
        for word in rest.split_whitespace() {
            match word.strip_prefix(PRAGMA_PREFIX) {
                Some(pragma) => directive.apply_pragma(pragma),
                None => directive.stacks.push(word.to_string()),
            }
        }
        Some(directive)
    }

    fn apply_pragma(&mut self, pragma: &str) {
        let body = pragma.strip_prefix(SET_CONTEXT_PREFIX).unwrap_or(pragma);
        if let Some((key, value)) = body.split_once('=') {
            self.context.insert(key.to_string(), value.to_string());
            return;
        }
        match body {
            ENABLE_LOOKUPS => self.enable_lookups = true,
            DISABLE_UPDATE_WORKFLOW => self.disable_update_workflow = true,
            INCLUDE_ASSETS_HASHES => self.include_assets_hashes = true,
            other => tracing::warn!(pragma = %other, "ignoring unknown pragma"),
        }
    }

    fn selects_all(&self) -> bool {
        self.stacks.iter().any(|s| s == ALL_STACKS)
    }
}

/// Suite inferred from a legacy directive
#[derive(Debug, Clone, PartialEq)]
pub struct LegacySuite {
    test_cases: IndexMap<String, TestCase>,
    enable_lookups: bool,
    context: BTreeMap<String, String>,
}

impl LegacySuite {
    /// Infer the suite of `test_name`
    ///
    /// `discovered` is the list of stacks the app defines.
    ///
    /// # Errors
    /// - `NoStacks` if the app defines no stacks
    /// - `AmbiguousStacks` if there is no stack selection and more than one stack
    /// - `UnknownStack` if a selected stack is not defined
    pub fn infer(test_name: &str, source: &str, discovered: &[String]) -> SuiteResult<Self> {
        let directive = LegacyDirective::parse(source).unwrap_or_default();

        let stacks = if directive.selects_all() || directive.stacks.is_empty() {
            if discovered.is_empty() {
                return Err(SuiteError::NoStacks {
                    test: test_name.to_string(),
                });
            }
            if !directive.selects_all() && discovered.len() > 1 {
                return Err(SuiteError::AmbiguousStacks {
                    test: test_name.to_string(),
                    stacks: discovered.to_vec(),
                });
            }
            discovered.to_vec()
        } else {
            if let Some(unknown) = directive.stacks.iter().find(|s| !discovered.contains(s)) {
                return Err(SuiteError::UnknownStack {
                    test: test_name.to_string(),
                    stack: unknown.clone(),
                });
            }
            directive.stacks.clone()
        };

        let options = TestOptions {
            stack_update_workflow: Some(!directive.disable_update_workflow),
            diff_assets: Some(directive.include_assets_hashes),
            ..TestOptions::default()
        };
        let mut test_cases = IndexMap::new();
        test_cases.insert(
            test_name.to_string(),
            TestCase::new(stacks).with_options(options),
        );

        tracing::debug!(
            test = %test_name,
            context = directive.context.len(),
            "inferred legacy test suite"
        );

        Ok(Self {
            test_cases,
            enable_lookups: directive.enable_lookups,
            context: directive.context,
        })
    }

    /// Test cases (always exactly one)
    #[inline]
    #[must_use]
    pub fn test_cases(&self) -> &IndexMap<String, TestCase> {
        &self.test_cases
    }

    /// Whether lookups were requested
    #[inline]
    #[must_use]
    pub fn enable_lookups(&self) -> bool {
        self.enable_lookups
    }

    /// Context from pragmas, applied to every synth
    #[inline]
    #[must_use]
    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    /// Write this suite as an `integ.json` so later runs skip inference
    ///
    /// # Errors
    /// Fails on serialization or IO errors
    pub fn save_manifest(&self, directory: impl AsRef<Path>) -> SuiteResult<()> {
        let manifest = IntegManifest {
            version: INTEG_MANIFEST_VERSION.to_string(),
            test_cases: self.test_cases.clone(),
            enable_lookups: Some(self.enable_lookups),
            synth_context: (!self.context.is_empty()).then(|| self.context.clone()),
        };
        manifest.save(directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::TestSuite;
    use pretty_assertions::assert_eq;

    fn stacks(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn parses_stacks_and_pragmas() {
        let source = "import x\n/// !cdk-integ StackA StackB pragma:enable-lookups pragma:set-context:k1=v1 pragma:k2=v2\n";
        let d = LegacyDirective::parse(source).unwrap();
        assert_eq!(d.stacks, stacks(&["StackA", "StackB"]));
        assert!(d.enable_lookups);
        assert!(!d.disable_update_workflow);
        assert_eq!(d.context.get("k1").map(String::as_str), Some("v1"));
        assert_eq!(d.context.get("k2").map(String::as_str), Some("v2"));
    }

    #[test]
    fn no_directive() {
        assert!(LegacyDirective::parse("const app = new App();").is_none());
    }

    #[test]
    fn unknown_flag_pragma_ignored() {
        let d = LegacyDirective::parse("// !cdk-integ pragma:frobnicate").unwrap();
        assert_eq!(d, LegacyDirective::default());
    }

    #[test]
    fn single_discovered_stack_without_directive() {
        let suite = LegacySuite::infer("integ.app", "", &stacks(&["Only"])).unwrap();
        assert_eq!(suite.test_cases()["integ.app"].stacks, stacks(&["Only"]));
    }

    #[test]
    fn several_stacks_without_directive_is_ambiguous() {
        let err = LegacySuite::infer("integ.app", "", &stacks(&["A", "B"])).unwrap_err();
        assert!(matches!(err, SuiteError::AmbiguousStacks { .. }));
    }

    #[test]
    fn wildcard_selects_all() {
        let suite =
            LegacySuite::infer("integ.app", "// !cdk-integ *", &stacks(&["A", "B"])).unwrap();
        assert_eq!(suite.test_cases()["integ.app"].stacks, stacks(&["A", "B"]));
    }

    #[test]
    fn unknown_selection_is_an_error() {
        let err = LegacySuite::infer("integ.app", "// !cdk-integ C", &stacks(&["A", "B"]))
            .unwrap_err();
        assert!(matches!(err, SuiteError::UnknownStack { ref stack, .. } if stack == "C"));
    }

    #[test]
    fn no_stacks_is_an_error() {
        let err = LegacySuite::infer("integ.app", "", &[]).unwrap_err();
        assert!(matches!(err, SuiteError::NoStacks { .. }));
    }

    #[test]
    fn flag_pragmas_map_to_options() {
        let source = "// !cdk-integ A pragma:disable-update-workflow pragma:include-assets-hashes";
        let suite = TestSuite::Legacy(LegacySuite::infer("t", source, &stacks(&["A"])).unwrap());
        assert_eq!(suite.stacks_without_update_workflow().len(), 1);
        assert!(suite.options_for_stack("A").unwrap().diff_assets());
    }

    #[test]
    fn saved_manifest_upgrades_to_declared_suite() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = "// !cdk-integ A pragma:set-context:flag=true";
        let legacy = LegacySuite::infer("integ.app", source, &stacks(&["A", "B"])).unwrap();
        legacy.save_manifest(dir.path()).unwrap();

        let declared = TestSuite::from_manifest_dir(dir.path()).unwrap();
        assert!(!declared.is_legacy());
        assert_eq!(declared.test_cases(), legacy.test_cases());
        assert_eq!(
            declared.synth_context().and_then(|c| c.get("flag")).map(String::as_str),
            Some("true")
        );
    }
}
