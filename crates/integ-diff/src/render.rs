//! Human readable diff rendering

use crate::impact::ReplacementKind;
use crate::template_diff::{PropertyDifference, TemplateDiff};
use serde_json::Value;
use std::fmt::Write;

const INDENT: &str = "    ";

/// Render a template diff grouped by section
///
/// ```text
/// Resources
/// [~] AWS::S3::Bucket Bucket83908E77 (WILL_REPLACE)
///     [~] BucketName (requires replacement)
///         [-] "old-name"
///         [+] "new-name"
/// ```
#[must_use]
pub fn format_differences(diff: &TemplateDiff) -> String {
    let mut out = String::new();

    let mut current_section: Option<&str> = None;
    for change in &diff.sections {
        if current_section != Some(change.section.as_str()) {
            let _ = writeln!(out, "{}", change.section);
            current_section = Some(change.section.as_str());
        }
        let label = if change.key.is_empty() {
            change.section.as_str()
        } else {
            change.key.as_str()
        };
        let _ = writeln!(out, "{} {label}", change.kind.marker());
        write_values(&mut out, 1, change.old.as_ref(), change.new.as_ref());
    }

    if !diff.resources.is_empty() {
        let _ = writeln!(out, "Resources");
    }
    for resource in &diff.resources {
        let _ = writeln!(
            out,
            "{} {} {} ({})",
            resource.kind.marker(),
            resource.display_type(),
            resource.logical_id,
            resource.impact
        );
        if let (Some(old), Some(new)) = (&resource.old_type, &resource.new_type) {
            if old != new {
                let _ = writeln!(out, "{INDENT}[~] Type");
                let _ = writeln!(out, "{INDENT}{INDENT}[-] {old}");
                let _ = writeln!(out, "{INDENT}{INDENT}[+] {new}");
            }
        }
        for change in resource.property_changes.iter().chain(&resource.other_changes) {
            write_property(&mut out, change);
        }
    }

    out
}

fn write_property(out: &mut String, change: &PropertyDifference) {
    let note = match change.replacement {
        Some(ReplacementKind::Always) => " (requires replacement)",
        Some(ReplacementKind::Conditional) => " (may cause replacement)",
        None => "",
    };
    let _ = writeln!(out, "{INDENT}{} {}{note}", change.kind.marker(), change.name);
    write_values(out, 2, change.old.as_ref(), change.new.as_ref());
}

fn write_values(out: &mut String, depth: usize, old: Option<&Value>, new: Option<&Value>) {
    let indent = INDENT.repeat(depth);
    if let Some(old) = old {
        let _ = writeln!(out, "{indent}[-] {}", compact(old));
    }
    if let Some(new) = new {
        let _ = writeln!(out, "{indent}[+] {}", compact(new));
    }
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}
