//! Cloud assembly manifest reader
//!
//! Reads `manifest.json` from an assembly directory and answers the questions
//! the snapshot workflow asks about it:
//! - which stacks exist
//! - which templates (including nested ones) belong to a stack
//! - which assets a stack references
//!
//! It also rewrites the manifest before it is committed as a snapshot:
//! stripping non-deterministic trace metadata and recording destructive
//! change annotations.

use crate::asset::AssetId;
use crate::error::{ManifestError, ManifestResult};
use crate::template::{TemplateEntry, NESTED_TEMPLATE_SUFFIX};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the assembly manifest
pub const MANIFEST_FILE: &str = "manifest.json";

/// Artifact type of a deployable stack
pub const STACK_ARTIFACT_TYPE: &str = "aws:cloudformation:stack";

/// Artifact type of an asset manifest
pub const ASSET_MANIFEST_ARTIFACT_TYPE: &str = "cdk:asset-manifest";

/// Metadata entry type that maps a construct path to a logical id
pub const LOGICAL_ID_METADATA_TYPE: &str = "aws:cdk:logicalId";

/// Metadata entry type of legacy (parameter-based) assets
pub const LEGACY_ASSET_METADATA_TYPE: &str = "aws:cdk:asset";

/// Prefix of the trace annotation written for destructive changes
pub const DESTRUCTIVE_CHANGES_TRACE_PREFIX: &str = "!!DESTRUCTIVE_CHANGES: ";

/// Top-level manifest document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyManifest {
    /// Schema version
    pub version: String,
    /// Artifacts by id, in file order
    #[serde(default)]
    pub artifacts: IndexMap<String, ArtifactManifest>,
    /// Fields this reader does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One artifact declared by the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactManifest {
    /// Artifact type tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    /// Metadata entries keyed by construct path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<IndexMap<String, Vec<MetadataEntry>>>,
    /// Ids of artifacts this one depends on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    /// Human readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Fields this reader does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ArtifactManifest {
    fn property_str(&self, key: &str) -> Option<&str> {
        self.properties
            .as_ref()
            .and_then(|p| p.get(key))
            .and_then(Value::as_str)
    }
}

/// One metadata entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Entry type tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Entry payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Creation stack trace (non-deterministic)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<String>>,
    /// Fields this reader does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reader over one assembly directory
#[derive(Debug, Clone)]
pub struct AssemblyManifestReader {
    directory: PathBuf,
    manifest_path: PathBuf,
    manifest: AssemblyManifest,
}

impl AssemblyManifestReader {
    /// Open the manifest in `directory`
    ///
    /// `directory` may also point directly at a manifest file.
    ///
    /// # Errors
    /// `ManifestError::ManifestNotFound` if the file is missing, unreadable
    /// or not a valid manifest.
    pub fn from_path(directory: impl AsRef<Path>) -> ManifestResult<Self> {
        let path = directory.as_ref();
        let (directory, manifest_path) = if path.is_file() {
            let dir = path.parent().map_or_else(PathBuf::new, Path::to_path_buf);
            (dir, path.to_path_buf())
        } else {
            (path.to_path_buf(), path.join(MANIFEST_FILE))
        };

        let text = fs::read_to_string(&manifest_path)
            .map_err(|e| ManifestError::not_found(&manifest_path, e.to_string()))?;
        let manifest: AssemblyManifest = serde_json::from_str(&text)
            .map_err(|e| ManifestError::not_found(&manifest_path, e.to_string()))?;

        tracing::debug!(
            path = %manifest_path.display(),
            artifacts = manifest.artifacts.len(),
            "loaded assembly manifest"
        );

        Ok(Self {
            directory,
            manifest_path,
            manifest,
        })
    }

    /// Assembly directory
    #[inline]
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Parsed manifest
    #[inline]
    #[must_use]
    pub fn manifest(&self) -> &AssemblyManifest {
        &self.manifest
    }

    /// Ids of all top-level stack artifacts, in manifest order
    #[must_use]
    pub fn stacks(&self) -> Vec<&str> {
        self.manifest
            .artifacts
            .iter()
            .filter(|(_, a)| a.kind == STACK_ARTIFACT_TYPE)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    fn stack_artifact(&self, stack_id: &str) -> ManifestResult<&ArtifactManifest> {
        match self.manifest.artifacts.get(stack_id) {
            Some(a) if a.kind == STACK_ARTIFACT_TYPE => Ok(a),
            Some(a) => Err(ManifestError::InvalidArtifact {
                id: stack_id.to_string(),
                message: format!("expected a stack artifact, found '{}'", a.kind),
            }),
            None => Err(ManifestError::ArtifactNotFound(stack_id.to_string())),
        }
    }

    /// Path of the stack's own template file
    ///
    /// # Errors
    /// Fails if the stack is unknown or declares no template file
    pub fn stack_template_file(&self, stack_id: &str) -> ManifestResult<PathBuf> {
        let artifact = self.stack_artifact(stack_id)?;
        let file = artifact
            .property_str("templateFile")
            .ok_or_else(|| ManifestError::InvalidArtifact {
                id: stack_id.to_string(),
                message: "missing properties.templateFile".to_string(),
            })?;
        Ok(self.directory.join(file))
    }

    /// Templates belonging to a stack, keyed by template id
    ///
    /// The stack's own template is keyed by the stack id; nested templates
    /// are keyed by their file name without the nested-template suffix.
    /// Unreadable templates are returned as [`TemplateEntry::Invalid`].
    ///
    /// # Errors
    /// Fails if the stack is unknown or declares no template file
    pub fn templates_for_stack(
        &self,
        stack_id: &str,
    ) -> ManifestResult<BTreeMap<String, TemplateEntry>> {
        let root_file = self.stack_template_file(stack_id)?;
        let mut templates = BTreeMap::new();
        let mut visited = HashSet::new();
        let mut pending = vec![(stack_id.to_string(), root_file)];

        while let Some((template_id, path)) = pending.pop() {
            if !visited.insert(path.clone()) {
                continue;
            }
            let entry = read_template(&path);
            if let TemplateEntry::Valid(template) = &entry {
                for nested in template.nested_template_files() {
                    let nested_id = nested
                        .strip_suffix(NESTED_TEMPLATE_SUFFIX)
                        .unwrap_or(&nested)
                        .to_string();
                    pending.push((nested_id, self.directory.join(&nested)));
                }
            }
            templates.insert(template_id, entry);
        }

        Ok(templates)
    }

    /// Asset ids referenced by a stack, de-duplicated in first-seen order
    ///
    /// Collects the `files` and `dockerImages` keys of every asset manifest
    /// the stack depends on, then ids of legacy asset metadata entries.
    ///
    /// # Errors
    /// Fails if the stack is unknown or an asset manifest cannot be read
    pub fn asset_ids_for_stack(&self, stack_id: &str) -> ManifestResult<Vec<AssetId>> {
        let artifact = self.stack_artifact(stack_id)?;
        let mut seen = HashSet::new();
        let mut ids = Vec::new();

        for dependency in artifact.dependencies.iter().flatten() {
            let Some(dep) = self.manifest.artifacts.get(dependency) else {
                continue;
            };
            if dep.kind != ASSET_MANIFEST_ARTIFACT_TYPE {
                continue;
            }
            let Some(file) = dep.property_str("file") else {
                continue;
            };
            let asset_manifest = read_json(&self.directory.join(file))?;
            for section in ["files", "dockerImages"] {
                if let Some(entries) = asset_manifest.get(section).and_then(Value::as_object) {
                    for id in entries.keys() {
                        if seen.insert(id.clone()) {
                            ids.push(AssetId::new(id.clone()));
                        }
                    }
                }
            }
        }

        for entry in artifact.metadata.iter().flat_map(|m| m.values()).flatten() {
            if entry.kind != LEGACY_ASSET_METADATA_TYPE {
                continue;
            }
            let id = entry.data.as_ref().and_then(|d| d.get("id")).and_then(Value::as_str);
            if let Some(id) = id {
                if seen.insert(id.to_string()) {
                    ids.push(AssetId::new(id));
                }
            }
        }

        Ok(ids)
    }

    /// Strip `trace` from every metadata entry of every artifact
    pub fn clean_manifest(&mut self) {
        let mut stripped = 0usize;
        for artifact in self.manifest.artifacts.values_mut() {
            for entry in artifact.metadata.iter_mut().flat_map(|m| m.values_mut()).flatten() {
                if entry.trace.take().is_some() {
                    stripped += 1;
                }
            }
        }
        tracing::debug!(stripped, "removed trace metadata");
    }

    /// Record destructive-change annotations as trace data
    ///
    /// `traces` maps stack id to logical id to impact tag (for example
    /// `WILL_DESTROY`). Template ids without a stack artifact are skipped.
    pub fn record_trace(&mut self, traces: &BTreeMap<String, BTreeMap<String, String>>) {
        for (stack_id, changes) in traces {
            let Some(artifact) = self.manifest.artifacts.get_mut(stack_id) else {
                tracing::debug!(stack = %stack_id, "no artifact to annotate");
                continue;
            };
            let metadata = artifact.metadata.get_or_insert_with(IndexMap::new);
            for (logical_id, tag) in changes {
                let trace = vec![format!("{DESTRUCTIVE_CHANGES_TRACE_PREFIX}{tag}")];
                let existing = metadata.values_mut().flatten().find(|e| {
                    e.kind == LOGICAL_ID_METADATA_TYPE
                        && e.data.as_ref().and_then(Value::as_str) == Some(logical_id.as_str())
                });
                match existing {
                    Some(entry) => entry.trace = Some(trace),
                    None => metadata
                        .entry(format!("/{stack_id}"))
                        .or_default()
                        .push(MetadataEntry {
                            kind: LOGICAL_ID_METADATA_TYPE.to_string(),
                            data: Some(Value::String(logical_id.clone())),
                            trace: Some(trace),
                            extra: Map::new(),
                        }),
                }
            }
        }
    }

    /// Write the (possibly rewritten) manifest back to disk
    ///
    /// # Errors
    /// Fails on serialization or IO errors
    pub fn save(&self) -> ManifestResult<()> {
        let mut text = serde_json::to_string_pretty(&self.manifest)?;
        text.push('\n');
        fs::write(&self.manifest_path, text)
            .map_err(|e| ManifestError::io_error(&self.manifest_path, e))
    }

    /// Delete the on-disk files of every asset referenced by a stack
    ///
    /// Removes `asset.<id>` entries (files or directories, with or without an
    /// extension) from the assembly directory. Returns the number removed.
    ///
    /// # Errors
    /// Fails if the stack is unknown or a removal fails
    pub fn remove_assets_for_stack(&self, stack_id: &str) -> ManifestResult<usize> {
        let ids = self.asset_ids_for_stack(stack_id)?;
        if ids.is_empty() {
            return Ok(0);
        }
        let entries = fs::read_dir(&self.directory)
            .map_err(|e| ManifestError::io_error(&self.directory, e))?;

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| ManifestError::io_error(&self.directory, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let matches = ids.iter().any(|id| {
                let stem = format!("asset.{id}");
                name == stem || name.starts_with(&format!("{stem}."))
            });
            if !matches {
                continue;
            }
            let path = entry.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            result.map_err(|e| ManifestError::io_error(&path, e))?;
            removed += 1;
        }
        tracing::debug!(stack = %stack_id, removed, "removed stack assets");
        Ok(removed)
    }
}

fn read_template(path: &Path) -> TemplateEntry {
    match fs::read_to_string(path) {
        Ok(text) => TemplateEntry::from_text(&text),
        Err(e) => TemplateEntry::Invalid {
            reason: format!("cannot read {}: {e}", path.display()),
        },
    }
}

fn read_json(path: &Path) -> ManifestResult<Value> {
    let text = fs::read_to_string(path).map_err(|e| ManifestError::io_error(path, e))?;
    serde_json::from_str(&text).map_err(|e| ManifestError::parse_error(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    const ASSET_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const ASSET_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn write(dir: &Path, name: &str, value: &Value) {
        fs::write(dir.join(name), serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    fn sample_assembly() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            MANIFEST_FILE,
            &json!({
                "version": "36.0.0",
                "artifacts": {
                    "StackA.assets": {
                        "type": "cdk:asset-manifest",
                        "properties": {"file": "StackA.assets.json"}
                    },
                    "StackA": {
                        "type": "aws:cloudformation:stack",
                        "environment": "aws://unknown-account/unknown-region",
                        "properties": {"templateFile": "StackA.template.json"},
                        "dependencies": ["StackA.assets"],
                        "metadata": {
                            "/StackA/Bucket/Resource": [
                                {"type": "aws:cdk:logicalId", "data": "Bucket83908E77", "trace": ["at new Bucket"]}
                            ],
                            "/StackA/Legacy": [
                                {"type": "aws:cdk:asset", "data": {"id": ASSET_B}}
                            ]
                        }
                    },
                    "Tree": {"type": "cdk:tree", "properties": {"file": "tree.json"}}
                }
            }),
        );
        write(
            dir.path(),
            "StackA.assets.json",
            &json!({"version": "36.0.0", "files": {ASSET_A: {}}, "dockerImages": {}}),
        );
        write(
            dir.path(),
            "StackA.template.json",
            &json!({
                "Resources": {
                    "Bucket83908E77": {"Type": "AWS::S3::Bucket"},
                    "NestedStack": {
                        "Type": "AWS::CloudFormation::Stack",
                        "Metadata": {"aws:asset:path": "StackANested.nested.template.json"}
                    }
                }
            }),
        );
        write(
            dir.path(),
            "StackANested.nested.template.json",
            &json!({"Resources": {"Queue": {"Type": "AWS::SQS::Queue"}}}),
        );
        dir
    }

    #[test]
    fn missing_manifest_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = AssemblyManifestReader::from_path(dir.path()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn unparseable_manifest_is_not_found() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "{ nope").unwrap();
        let err = AssemblyManifestReader::from_path(dir.path()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn lists_only_stack_artifacts() {
        let dir = sample_assembly();
        let reader = AssemblyManifestReader::from_path(dir.path()).unwrap();
        assert_eq!(reader.stacks(), vec!["StackA"]);
    }

    #[test]
    fn templates_include_nested() {
        let dir = sample_assembly();
        let reader = AssemblyManifestReader::from_path(dir.path()).unwrap();
        let templates = reader.templates_for_stack("StackA").unwrap();
        let ids: Vec<_> = templates.keys().cloned().collect();
        assert_eq!(ids, vec!["StackA".to_string(), "StackANested".to_string()]);
        assert!(templates.values().all(|t| t.as_template().is_some()));
    }

    #[test]
    fn unknown_stack_is_an_error() {
        let dir = sample_assembly();
        let reader = AssemblyManifestReader::from_path(dir.path()).unwrap();
        assert!(matches!(
            reader.templates_for_stack("Nope"),
            Err(ManifestError::ArtifactNotFound(_))
        ));
        assert!(matches!(
            reader.templates_for_stack("Tree"),
            Err(ManifestError::InvalidArtifact { .. })
        ));
    }

    #[test]
    fn asset_ids_from_manifest_and_legacy_metadata() {
        let dir = sample_assembly();
        let reader = AssemblyManifestReader::from_path(dir.path()).unwrap();
        let ids = reader.asset_ids_for_stack("StackA").unwrap();
        assert_eq!(ids, vec![AssetId::new(ASSET_A), AssetId::new(ASSET_B)]);
    }

    #[test]
    fn clean_and_record_trace_round_trip() {
        let dir = sample_assembly();
        let mut reader = AssemblyManifestReader::from_path(dir.path()).unwrap();
        reader.clean_manifest();

        let mut traces = BTreeMap::new();
        traces.insert(
            "StackA".to_string(),
            BTreeMap::from([
                ("Bucket83908E77".to_string(), "WILL_DESTROY".to_string()),
                ("Gone".to_string(), "WILL_REPLACE".to_string()),
            ]),
        );
        reader.record_trace(&traces);
        reader.save().unwrap();

        let reread = AssemblyManifestReader::from_path(dir.path()).unwrap();
        let metadata = reread.manifest().artifacts["StackA"].metadata.clone().unwrap();
        let bucket = &metadata["/StackA/Bucket/Resource"][0];
        assert_eq!(
            bucket.trace,
            Some(vec!["!!DESTRUCTIVE_CHANGES: WILL_DESTROY".to_string()])
        );
        let added = &metadata["/StackA"][0];
        assert_eq!(added.data, Some(json!("Gone")));
        // environment survives untouched
        assert_eq!(
            reread.manifest().artifacts["StackA"].extra.get("environment"),
            Some(&json!("aws://unknown-account/unknown-region"))
        );
    }

    #[test]
    fn remove_assets_for_stack_deletes_matching_entries() {
        let dir = sample_assembly();
        fs::create_dir(dir.path().join(format!("asset.{ASSET_A}"))).unwrap();
        fs::write(dir.path().join(format!("asset.{ASSET_B}.zip")), b"zip").unwrap();
        fs::write(dir.path().join("asset.unrelated"), b"keep").unwrap();

        let reader = AssemblyManifestReader::from_path(dir.path()).unwrap();
        assert_eq!(reader.remove_assets_for_stack("StackA").unwrap(), 2);
        assert!(dir.path().join("asset.unrelated").exists());
        assert!(!dir.path().join(format!("asset.{ASSET_A}")).exists());
    }
}
