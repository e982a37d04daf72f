//! Integration jobs against a scripted deployment backend

use integ_core::worker::integ_job;
use integ_core::{EventSink, ExecutionContext, JobSettings};
use integ_diff::DiagnosticReason;
use integ_suite::{TestCase, TestUnit};
use integ_test_utils::{assertion_outputs, AssemblyWriter, FakeDriver, TemplateBuilder};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn unit(root: &TempDir) -> TestUnit {
    let file = root.path().join("integ.bucket.js");
    fs::write(&file, "// app").unwrap();
    TestUnit::new(file, root.path(), None)
}

fn assembly(case: TestCase) -> AssemblyWriter {
    AssemblyWriter::new()
        .stack(
            "StackA",
            TemplateBuilder::new()
                .resource("Bucket", "AWS::S3::Bucket", json!({"BucketName": "data"}))
                .build(),
        )
        .test_case("integ-bucket/DefaultTest", case)
}

fn settings() -> JobSettings {
    JobSettings {
        update_workflow: false,
        ..JobSettings::default()
    }
}

#[tokio::test]
async fn two_failing_assertions_give_two_diagnostics() {
    let root = TempDir::new().unwrap();
    let case = TestCase::new(["StackA"])
        .with_assertion_stack("IntegTest/DefaultTest/DeployAssert", "IntegTestDeployAssert");
    let driver = Arc::new(FakeDriver::new(assembly(case)));
    driver.set_outputs(assertion_outputs(
        "IntegTestDeployAssert",
        &[
            ("AssertionResultsBucketExists", "success", None),
            ("AssertionResultsObjectCount", "fail", Some("expected 1, got 0")),
            ("AssertionResultsTagged", "fail", Some("missing tag")),
        ],
    ));

    let outcome = integ_job(
        driver,
        ExecutionContext::new("us-east-1", None),
        unit(&root),
        Vec::new(),
        settings(),
        EventSink::disabled(),
    )
    .await;

    assert!(outcome.failed());
    assert_eq!(outcome.diagnostics.len(), 2);
    for diagnostic in &outcome.diagnostics {
        assert_eq!(diagnostic.reason, DiagnosticReason::AssertionFailed);
        assert_eq!(diagnostic.test_name, "integ.bucket-integ-bucket/DefaultTest (default/us-east-1)");
        assert!(diagnostic.duration.is_some());
    }
    assert!(outcome.diagnostics[0].message.starts_with("AssertionResultsObjectCount - failed"));
    assert!(outcome.diagnostics[1].message.starts_with("AssertionResultsTagged - failed"));
}

#[tokio::test]
async fn success_is_named_with_its_context() {
    let root = TempDir::new().unwrap();
    let driver = Arc::new(FakeDriver::new(assembly(TestCase::new(["StackA"]))));

    let outcome = integ_job(
        driver,
        ExecutionContext::new("eu-west-1", Some("ci".to_string())),
        unit(&root),
        Vec::new(),
        settings(),
        EventSink::disabled(),
    )
    .await;

    assert!(!outcome.failed());
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].reason, DiagnosticReason::TestSuccess);
    assert_eq!(outcome.diagnostics[0].test_name, "integ.bucket-integ-bucket/DefaultTest (ci/eu-west-1)");
}
