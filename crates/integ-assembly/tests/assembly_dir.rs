use integ_assembly::{
    AssemblyManifestReader, AssetId, SnapshotAssembly, TemplateEntry, MANIFEST_FILE,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const HASH: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

fn write(dir: &Path, name: &str, value: &Value) {
    fs::write(dir.join(name), serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

fn two_stack_assembly() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        MANIFEST_FILE,
        &json!({
            "version": "36.0.0",
            "artifacts": {
                "Assets": {"type": "cdk:asset-manifest", "properties": {"file": "assets.json"}},
                "StackA": {
                    "type": "aws:cloudformation:stack",
                    "properties": {"templateFile": "StackA.template.json"},
                    "dependencies": ["Assets"]
                },
                "StackB": {
                    "type": "aws:cloudformation:stack",
                    "properties": {"templateFile": "StackB.template.json"}
                }
            }
        }),
    );
    write(dir.path(), "assets.json", &json!({"files": {HASH: {}}}));
    write(
        dir.path(),
        "StackA.template.json",
        &json!({"Resources": {"Fn": {"Type": "AWS::Lambda::Function", "Properties": {"Code": HASH}}}}),
    );
    fs::write(dir.path().join("StackB.template.json"), "[1, 2, 3]").unwrap();
    dir
}

#[test]
fn test_assembly_from_dir_reads_all_stacks() {
    let dir = two_stack_assembly();
    let assembly = SnapshotAssembly::from_dir(dir.path(), None).unwrap();

    let names: Vec<_> = assembly.stacks().keys().cloned().collect();
    assert_eq!(names, vec!["StackA".to_string(), "StackB".to_string()]);
    assert_eq!(assembly.stack("StackA").unwrap().assets, vec![AssetId::new(HASH)]);
    assert!(assembly.stack("StackB").unwrap().assets.is_empty());
}

#[test]
fn test_malformed_template_is_kept_as_invalid() {
    let dir = two_stack_assembly();
    let assembly = SnapshotAssembly::from_dir(dir.path(), None).unwrap();
    let entry = &assembly.stack("StackB").unwrap().templates["StackB"];
    assert!(matches!(entry, TemplateEntry::Invalid { .. }));
}

#[test]
fn test_filter_restricts_stacks() {
    let dir = two_stack_assembly();
    let filter = BTreeSet::from(["StackB".to_string(), "Missing".to_string()]);
    let assembly = SnapshotAssembly::from_dir(dir.path(), Some(&filter)).unwrap();
    assert_eq!(assembly.stacks().len(), 1);
    assert!(assembly.stack("StackB").is_some());
}

#[test]
fn test_record_trace_skips_unknown_stacks() {
    let dir = two_stack_assembly();
    let mut reader = AssemblyManifestReader::from_path(dir.path()).unwrap();
    let before = reader.manifest().clone();

    let mut traces = BTreeMap::new();
    traces.insert(
        "NotAStack".to_string(),
        BTreeMap::from([("R1".to_string(), "WILL_DESTROY".to_string())]),
    );
    reader.record_trace(&traces);
    assert_eq!(reader.manifest(), &before);
}

#[test]
fn test_manifest_file_path_accepted() {
    let dir = two_stack_assembly();
    let reader = AssemblyManifestReader::from_path(dir.path().join(MANIFEST_FILE)).unwrap();
    assert_eq!(reader.directory(), dir.path());
    assert_eq!(reader.stacks(), vec!["StackA", "StackB"]);
}
