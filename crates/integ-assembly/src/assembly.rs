//! Snapshot assembly
//!
//! The transient structural model the diff engine compares: per stack, the
//! templates that belong to it and the asset ids it references.

use crate::asset::AssetId;
use crate::error::ManifestResult;
use crate::manifest::AssemblyManifestReader;
use crate::template::TemplateEntry;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Templates and assets of one stack
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotStack {
    /// Templates keyed by template id
    pub templates: BTreeMap<String, TemplateEntry>,
    /// Assets referenced by the stack
    pub assets: Vec<AssetId>,
}

impl SnapshotStack {
    /// Create empty stack
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template
    #[must_use]
    pub fn with_template(mut self, id: impl Into<String>, entry: impl Into<TemplateEntry>) -> Self {
        self.templates.insert(id.into(), entry.into());
        self
    }

    /// Add an asset id
    #[must_use]
    pub fn with_asset(mut self, id: impl Into<AssetId>) -> Self {
        self.assets.push(id.into());
        self
    }
}

/// Stack name to stack contents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotAssembly {
    stacks: BTreeMap<String, SnapshotStack>,
}

impl SnapshotAssembly {
    /// Create empty assembly
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stack
    #[must_use]
    pub fn with_stack(mut self, name: impl Into<String>, stack: SnapshotStack) -> Self {
        self.stacks.insert(name.into(), stack);
        self
    }

    /// Insert or replace a stack
    pub fn insert(&mut self, name: impl Into<String>, stack: SnapshotStack) {
        self.stacks.insert(name.into(), stack);
    }

    /// All stacks
    #[inline]
    #[must_use]
    pub fn stacks(&self) -> &BTreeMap<String, SnapshotStack> {
        &self.stacks
    }

    /// One stack by name
    #[inline]
    #[must_use]
    pub fn stack(&self, name: &str) -> Option<&SnapshotStack> {
        self.stacks.get(name)
    }

    /// Whether no stacks are present
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Build from a reader, optionally restricted to `filter`
    ///
    /// Stacks named in `filter` but absent from the manifest are skipped.
    ///
    /// # Errors
    /// Propagates template-file and asset-manifest errors
    pub fn from_reader(
        reader: &AssemblyManifestReader,
        filter: Option<&BTreeSet<String>>,
    ) -> ManifestResult<Self> {
        let mut assembly = Self::new();
        for stack_id in reader.stacks() {
            if filter.is_some_and(|f| !f.contains(stack_id)) {
                continue;
            }
            let stack = SnapshotStack {
                templates: reader.templates_for_stack(stack_id)?,
                assets: reader.asset_ids_for_stack(stack_id)?,
            };
            assembly.insert(stack_id, stack);
        }
        tracing::debug!(
            directory = %reader.directory().display(),
            stacks = assembly.stacks.len(),
            "built snapshot assembly"
        );
        Ok(assembly)
    }

    /// Open `directory` and build the assembly
    ///
    /// # Errors
    /// `ManifestNotFound` if the directory has no manifest, else as
    /// [`SnapshotAssembly::from_reader`]
    pub fn from_dir(
        directory: impl AsRef<Path>,
        filter: Option<&BTreeSet<String>>,
    ) -> ManifestResult<Self> {
        let reader = AssemblyManifestReader::from_path(directory)?;
        Self::from_reader(&reader, filter)
    }
}
