//! Assembly diff engine
//!
//! Compares an expected (snapshot) assembly with an actual (fresh synth)
//! assembly template by template.

use crate::canonicalize::canonicalize_template;
use crate::diagnostic::{Diagnostic, DiagnosticReason, DiffConfig};
use crate::impact::{DestructiveChange, ResourceImpact};
use crate::render::format_differences;
use crate::template_diff::TemplateDiff;
use integ_assembly::{SnapshotAssembly, SnapshotStack, Template, TemplateEntry};
use integ_suite::TestSuite;
use std::collections::{BTreeMap, BTreeSet};

/// Per-stack settings the engine consults
pub trait StackPolicy {
    /// Whether asset hashes are compared verbatim for `stack`
    fn diff_assets(&self, stack: &str) -> bool;

    /// Whether destroying `resource_type` in `stack` is allowed
    fn allows_destroy(&self, stack: &str, resource_type: &str) -> bool;
}

impl StackPolicy for TestSuite {
    fn diff_assets(&self, stack: &str) -> bool {
        self.options_for_stack(stack).is_some_and(|o| o.diff_assets())
    }

    fn allows_destroy(&self, stack: &str, resource_type: &str) -> bool {
        self.options_for_stack(stack)
            .is_some_and(|o| o.allows_destroy_of(resource_type))
    }
}

/// Result of diffing two assemblies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblyDiff {
    /// Snapshot mismatches
    pub diagnostics: Vec<Diagnostic>,
    /// Flagged resource changes
    pub destructive_changes: Vec<DestructiveChange>,
}

impl AssemblyDiff {
    /// Whether the assemblies matched
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty() && self.destructive_changes.is_empty()
    }

    /// Destructive changes as stack to logical id to impact tag
    #[must_use]
    pub fn destructive_traces(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        traces_for(&self.destructive_changes)
    }
}

/// Group destructive changes as stack to logical id to impact tag
#[must_use]
pub fn traces_for(changes: &[DestructiveChange]) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut traces: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for change in changes {
        traces
            .entry(change.stack_name.clone())
            .or_default()
            .insert(change.logical_id.clone(), change.impact.tag().to_string());
    }
    traces
}

/// Diff `expected` against `actual`
///
/// Template ids present on only one side produce a mismatch diagnostic.
/// Templates on both sides are canonicalized (unless the owning stack diffs
/// assets) and compared; any difference produces one diagnostic carrying the
/// rendered diff, and destructive resource changes not allow-listed for the
/// stack are collected.
#[must_use]
pub fn diff_assembly(
    test_name: &str,
    expected: &SnapshotAssembly,
    actual: &SnapshotAssembly,
    policy: &dyn StackPolicy,
) -> AssemblyDiff {
    let mut result = AssemblyDiff::default();
    let empty = SnapshotStack::default();

    let stack_names: BTreeSet<&String> = expected
        .stacks()
        .keys()
        .chain(actual.stacks().keys())
        .collect();

    for stack_name in stack_names {
        let expected_stack = expected.stack(stack_name).unwrap_or(&empty);
        let actual_stack = actual.stack(stack_name).unwrap_or(&empty);

        for template_id in expected_stack.templates.keys() {
            if !actual_stack.templates.contains_key(template_id) {
                result.diagnostics.push(Diagnostic::new(
                    test_name,
                    template_id,
                    DiagnosticReason::SnapshotFailed,
                    format!("{template_id} exists in snapshot, but not in actual"),
                ));
            }
        }

        for (template_id, actual_entry) in &actual_stack.templates {
            let Some(expected_entry) = expected_stack.templates.get(template_id) else {
                result.diagnostics.push(Diagnostic::new(
                    test_name,
                    template_id,
                    DiagnosticReason::SnapshotFailed,
                    format!("{template_id} does not exist in snapshot, but does in actual"),
                ));
                continue;
            };
            diff_template(
                test_name,
                stack_name,
                template_id,
                (expected_stack, expected_entry),
                (actual_stack, actual_entry),
                policy,
                &mut result,
            );
        }
    }

    tracing::debug!(
        test = %test_name,
        diagnostics = result.diagnostics.len(),
        destructive = result.destructive_changes.len(),
        "assembly diff complete"
    );
    result
}

fn diff_template(
    test_name: &str,
    stack_name: &str,
    template_id: &str,
    (expected_stack, expected_entry): (&SnapshotStack, &TemplateEntry),
    (actual_stack, actual_entry): (&SnapshotStack, &TemplateEntry),
    policy: &dyn StackPolicy,
    result: &mut AssemblyDiff,
) {
    let (expected_template, actual_template) = match (expected_entry, actual_entry) {
        (TemplateEntry::Valid(e), TemplateEntry::Valid(a)) => (e, a),
        (TemplateEntry::Invalid { reason }, _) | (_, TemplateEntry::Invalid { reason }) => {
            result.diagnostics.push(Diagnostic::new(
                test_name,
                template_id,
                DiagnosticReason::SnapshotFailed,
                format!("{template_id} could not be compared: {reason}"),
            ));
            return;
        }
    };

    let config = DiffConfig {
        diff_assets: policy.diff_assets(stack_name),
    };
    let (expected_template, actual_template) = if config.diff_assets {
        (expected_template.clone(), actual_template.clone())
    } else {
        match (
            canonical(expected_template, expected_stack),
            canonical(actual_template, actual_stack),
        ) {
            (Some(e), Some(a)) => (e, a),
            _ => (expected_template.clone(), actual_template.clone()),
        }
    };

    let diff = TemplateDiff::compute(&expected_template, &actual_template);
    if diff.is_empty() {
        return;
    }

    for resource in &diff.resources {
        let (impact, resource_type) = if resource.is_removal() {
            (ResourceImpact::WillDestroy, resource.old_type.as_deref())
        } else if resource.impact.is_destructive() {
            (resource.impact, resource.new_type.as_deref())
        } else {
            continue;
        };
        if policy.allows_destroy(stack_name, resource_type.unwrap_or_default()) {
            continue;
        }
        result.destructive_changes.push(DestructiveChange {
            impact,
            logical_id: resource.logical_id.clone(),
            stack_name: template_id.to_string(),
        });
    }

    result.diagnostics.push(
        Diagnostic::new(
            test_name,
            template_id,
            DiagnosticReason::SnapshotFailed,
            format_differences(&diff),
        )
        .with_config(config),
    );
}

fn canonical(template: &Template, stack: &SnapshotStack) -> Option<Template> {
    Template::from_value(canonicalize_template(template.body(), &stack.assets)).ok()
}
