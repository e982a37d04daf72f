//! Snapshot diff engine
//!
//! Decides what changed between a committed snapshot and a fresh synth, and
//! whether a change is dangerous.
//!
//! # Core Concepts
//!
//! - [`canonicalize_template`]: replaces asset hashes with stable placeholders
//! - [`TemplateDiff`]: structural diff of two templates with per-resource [`ResourceImpact`]
//! - [`diff_assembly`]: compares two [`SnapshotAssembly`](integ_assembly::SnapshotAssembly)
//!   values and yields [`Diagnostic`]s plus [`DestructiveChange`]s
//! - [`format_differences`]: human readable rendering

#![warn(unreachable_pub)]

mod canonicalize;
mod diagnostic;
mod engine;
mod impact;
mod render;
mod template_diff;

pub use canonicalize::canonicalize_template;
pub use diagnostic::{Diagnostic, DiagnosticReason, DiffConfig};
pub use engine::{diff_assembly, traces_for, AssemblyDiff, StackPolicy};
pub use impact::{
    property_impact, replacement_kind, DestructiveChange, ReplacementKind, ResourceImpact,
};
pub use render::format_differences;
pub use template_diff::{
    ChangeKind, PropertyDifference, ResourceDifference, SectionDifference, TemplateDiff,
};
