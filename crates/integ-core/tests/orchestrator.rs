//! Two-phase runs over several units

use integ_core::{EventSink, Orchestrator, RunnerConfig};
use integ_diff::DiagnosticReason;
use integ_suite::{TestCase, TestUnit};
use integ_test_utils::{AssemblyWriter, FakeDriver, TemplateBuilder};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn unit(root: &TempDir, name: &str) -> TestUnit {
    let file = root.path().join(name);
    fs::write(&file, "// app").unwrap();
    TestUnit::new(file, root.path(), None)
}

fn assembly(bucket_name: &str) -> AssemblyWriter {
    AssemblyWriter::new()
        .stack(
            "StackA",
            TemplateBuilder::new()
                .resource("Bucket", "AWS::S3::Bucket", json!({"BucketName": bucket_name}))
                .build(),
        )
        .test_case("integ/DefaultTest", TestCase::new(["StackA"]))
}

fn config() -> RunnerConfig {
    RunnerConfig {
        max_workers: 2,
        parallel_regions: vec!["us-east-1".to_string(), "eu-west-1".to_string()],
        update_workflow: false,
        ..RunnerConfig::default()
    }
}

#[tokio::test]
async fn missing_snapshot_is_created_when_updating_failures() {
    let root = TempDir::new().unwrap();
    let existing = unit(&root, "integ.existing.js");
    let fresh = unit(&root, "integ.fresh.js");
    assembly("data").write(existing.snapshot_dir()).unwrap();

    let driver = Arc::new(FakeDriver::new(assembly("data")));
    let orchestrator = Orchestrator::new(
        driver.clone(),
        RunnerConfig {
            update_on_failed: true,
            ..config()
        },
        EventSink::disabled(),
    );
    let summary = orchestrator.run(vec![existing.clone(), fresh.clone()]).await;

    let mut reasons: Vec<_> = summary.snapshots.iter().flat_map(|o| o.diagnostics.iter().map(|d| d.reason)).collect();
    reasons.sort();
    assert_eq!(reasons, vec![DiagnosticReason::SnapshotSuccess, DiagnosticReason::NoSnapshot]);

    assert_eq!(summary.integ.len(), 1);
    assert_eq!(summary.integ[0].unit, fresh);
    assert_eq!(summary.integ[0].diagnostics[0].reason, DiagnosticReason::TestSuccess);
    assert!(fresh.snapshot_dir().join("manifest.json").exists());
    assert!(summary.success());
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test]
async fn snapshot_failure_without_update_fails_run() {
    let root = TempDir::new().unwrap();
    let changed = unit(&root, "integ.changed.js");
    assembly("data").write(changed.snapshot_dir()).unwrap();

    let driver = Arc::new(FakeDriver::new(assembly("renamed")));
    let orchestrator = Orchestrator::new(driver.clone(), config(), EventSink::disabled());
    let summary = orchestrator.run(vec![changed]).await;

    assert!(summary.integ.is_empty());
    assert!(driver.deploys().is_empty());
    assert_eq!(
        summary.failed_units().into_iter().collect::<Vec<_>>(),
        vec!["integ.changed".to_string()]
    );
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn forced_run_deploys_in_every_region() {
    let root = TempDir::new().unwrap();
    let units: Vec<_> = (0..3)
        .map(|i| unit(&root, &format!("integ.unit{i}.js")))
        .collect();
    for u in &units {
        assembly("data").write(u.snapshot_dir()).unwrap();
    }

    let driver = Arc::new(FakeDriver::new(assembly("data")));
    let orchestrator = Orchestrator::new(
        driver.clone(),
        RunnerConfig {
            force: true,
            clean: false,
            ..config()
        },
        EventSink::disabled(),
    );
    let summary = orchestrator.run(units).await;

    assert_eq!(summary.integ.len(), 3);
    assert!(driver.destroys().is_empty());
    let regions: std::collections::BTreeSet<_> = driver.deploys().into_iter().map(|d| d.region).collect();
    assert!(regions.iter().all(|r| r == "us-east-1" || r == "eu-west-1"));
    assert!(summary.render_metrics().contains("integration tests:"));
    assert!(summary.success());
}
