//! Cloud assembly reader
//!
//! Parses the directory a synth run emits (a `manifest.json`, one template
//! per stack, nested templates and asset manifests) into the structural
//! model the snapshot diff consumes.
//!
//! # Core Concepts
//!
//! - [`AssemblyManifestReader`]: stack listing, template and asset lookup,
//!   trace stripping and destructive-change recording
//! - [`Template`]: a rendered template tree
//! - [`SnapshotAssembly`]: stack name to templates and asset ids
//! - [`AssetId`]: content-addressed asset identifier
//!
//! # Example
//!
//! ```rust,ignore
//! use integ_assembly::SnapshotAssembly;
//!
//! let expected = SnapshotAssembly::from_dir("test/integ.bucket.js.snapshot", None)?;
//! for (name, stack) in expected.stacks() {
//!     println!("{name}: {} templates", stack.templates.len());
//! }
//! ```

#![warn(unreachable_pub)]

mod assembly;
mod asset;
mod error;
mod manifest;
mod template;

pub use assembly::{SnapshotAssembly, SnapshotStack};
pub use asset::{is_content_hash, AssetId, CONTENT_HASH_HEX_LEN};
pub use error::{ManifestError, ManifestResult};
pub use manifest::{
    ArtifactManifest, AssemblyManifest, AssemblyManifestReader, MetadataEntry,
    ASSET_MANIFEST_ARTIFACT_TYPE, DESTRUCTIVE_CHANGES_TRACE_PREFIX, LEGACY_ASSET_METADATA_TYPE,
    LOGICAL_ID_METADATA_TYPE, MANIFEST_FILE, STACK_ARTIFACT_TYPE,
};
pub use template::{
    Template, TemplateEntry, ASSET_PATH_METADATA_KEY, NESTED_STACK_TYPE, NESTED_TEMPLATE_SUFFIX,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
