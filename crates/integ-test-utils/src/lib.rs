//! Testing utilities for the integ runner workspace
//!
//! Template and assembly builders that write real assembly directories, and
//! a scripted [`FakeDriver`] standing in for the deployment backend.

#![allow(missing_docs)]

use async_trait::async_trait;
use indexmap::IndexMap;
use integ_assembly::{
    ASSET_MANIFEST_ARTIFACT_TYPE, LOGICAL_ID_METADATA_TYPE, MANIFEST_FILE, STACK_ARTIFACT_TYPE,
};
use integ_core::{
    DeployRequest, DeploymentDriver, DestroyRequest, DriverError, ListRequest, SynthRequest,
    WatchOutput, WatchSession,
};
use integ_suite::{IntegManifest, TestCase, INTEG_MANIFEST_VERSION};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Hex sha256 of `seed`, shaped like a real asset id
pub fn sample_asset_hash(seed: &str) -> String {
    hex::encode(Sha256::digest(seed.as_bytes()))
}

#[derive(Debug, Clone, Default)]
pub struct TemplateBuilder {
    sections: IndexMap<String, Map<String, Value>>,
}

impl TemplateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn section(&mut self, name: &str) -> &mut Map<String, Value> {
        self.sections.entry(name.to_string()).or_default()
    }

    pub fn resource(self, logical_id: &str, resource_type: &str, properties: Value) -> Self {
        self.resource_value(
            logical_id,
            json!({"Type": resource_type, "Properties": properties}),
        )
    }

    pub fn resource_value(mut self, logical_id: &str, resource: Value) -> Self {
        self.section("Resources").insert(logical_id.to_string(), resource);
        self
    }

    pub fn parameter(mut self, name: &str, parameter: Value) -> Self {
        self.section("Parameters").insert(name.to_string(), parameter);
        self
    }

    pub fn output(mut self, name: &str, output: Value) -> Self {
        self.section("Outputs").insert(name.to_string(), output);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(
            self.sections
                .into_iter()
                .map(|(name, section)| (name, Value::Object(section)))
                .collect(),
        )
    }
}

#[derive(Debug, Clone)]
struct StackFixture {
    name: String,
    template: Value,
    assets: Vec<String>,
}

/// Writes a cloud assembly directory
#[derive(Debug, Clone, Default)]
pub struct AssemblyWriter {
    stacks: Vec<StackFixture>,
    nested: Vec<(String, Value)>,
    test_cases: IndexMap<String, TestCase>,
    enable_lookups: bool,
    synth_context: BTreeMap<String, String>,
}

impl AssemblyWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stack(self, name: &str, template: Value) -> Self {
        self.stack_with_assets(name, template, &[])
    }

    pub fn stack_with_assets(mut self, name: &str, template: Value, assets: &[String]) -> Self {
        self.stacks.push(StackFixture {
            name: name.to_string(),
            template,
            assets: assets.to_vec(),
        });
        self
    }

    pub fn nested(mut self, file_name: &str, template: Value) -> Self {
        self.nested.push((file_name.to_string(), template));
        self
    }

    /// Declare a test case, which makes the assembly carry an `integ.json`
    pub fn test_case(mut self, name: &str, case: TestCase) -> Self {
        self.test_cases.insert(name.to_string(), case);
        self
    }

    /// Declared synth context entry, written to `integ.json`
    pub fn synth_context(mut self, key: &str, value: &str) -> Self {
        self.synth_context.insert(key.to_string(), value.to_string());
        self
    }

    pub fn enable_lookups(mut self) -> Self {
        self.enable_lookups = true;
        self
    }

    pub fn stack_names(&self) -> Vec<String> {
        self.stacks.iter().map(|s| s.name.clone()).collect()
    }

    pub fn write(&self, directory: &Path) -> io::Result<()> {
        fs::create_dir_all(directory)?;
        let mut artifacts = Map::new();

        for stack in &self.stacks {
            let template_file = format!("{}.template.json", stack.name);
            write_json(&directory.join(&template_file), &stack.template)?;

            let mut metadata = Map::new();
            if let Some(resources) = stack.template.get("Resources").and_then(Value::as_object) {
                for logical_id in resources.keys() {
                    metadata.insert(
                        format!("/{}/{logical_id}/Resource", stack.name),
                        json!([{
                            "type": LOGICAL_ID_METADATA_TYPE,
                            "data": logical_id,
                            "trace": ["at Object.<anonymous> (/home/dev/app.js:12:3)"]
                        }]),
                    );
                }
            }

            let mut dependencies = Vec::new();
            if !stack.assets.is_empty() {
                let manifest_id = format!("{}.assets", stack.name);
                let manifest_file = format!("{}.assets.json", stack.name);
                let mut files = Map::new();
                for id in &stack.assets {
                    files.insert(
                        id.clone(),
                        json!({"source": {"path": format!("asset.{id}"), "packaging": "zip"}, "destinations": {}}),
                    );
                    let asset_dir = directory.join(format!("asset.{id}"));
                    fs::create_dir_all(&asset_dir)?;
                    fs::write(asset_dir.join("index.js"), format!("// {id}\n"))?;
                }
                write_json(
                    &directory.join(&manifest_file),
                    &json!({"version": INTEG_MANIFEST_VERSION, "files": files, "dockerImages": {}}),
                )?;
                artifacts.insert(
                    manifest_id.clone(),
                    json!({"type": ASSET_MANIFEST_ARTIFACT_TYPE, "properties": {"file": manifest_file}}),
                );
                dependencies.push(manifest_id);
            }

            artifacts.insert(
                stack.name.clone(),
                json!({
                    "type": STACK_ARTIFACT_TYPE,
                    "environment": "aws://unknown-account/unknown-region",
                    "properties": {"templateFile": template_file},
                    "dependencies": dependencies,
                    "metadata": metadata,
                    "displayName": stack.name,
                }),
            );
        }

        for (file_name, template) in &self.nested {
            write_json(&directory.join(file_name), template)?;
        }

        write_json(
            &directory.join(MANIFEST_FILE),
            &json!({"version": INTEG_MANIFEST_VERSION, "artifacts": artifacts}),
        )?;

        if !self.test_cases.is_empty() {
            let manifest = IntegManifest {
                version: INTEG_MANIFEST_VERSION.to_string(),
                test_cases: self.test_cases.clone(),
                enable_lookups: Some(self.enable_lookups),
                synth_context: (!self.synth_context.is_empty())
                    .then(|| self.synth_context.clone()),
            };
            manifest
                .save(directory)
                .map_err(|e| io::Error::other(e.to_string()))?;
        }
        Ok(())
    }
}

fn write_json(path: &Path, value: &Value) -> io::Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    fs::write(path, text)
}

/// Call recorded by [`FakeDriver`]
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Synth(SynthRequest),
    Deploy(DeployRequest),
    Destroy(DestroyRequest),
    List(ListRequest),
    Watch(DeployRequest),
}

#[derive(Debug, Default)]
struct Script {
    synth_failure: Option<String>,
    deploy_failure: Option<String>,
    destroy_failure: Option<String>,
    outputs: Option<Value>,
    exit_with_outputs: bool,
}

/// Scripted deployment backend
///
/// Synth (and deploy, like the real CLI) writes the configured assembly into
/// the requested output directory. Deploy requests with an outputs file get
/// the configured outputs written there.
#[derive(Debug)]
pub struct FakeDriver {
    assembly: Mutex<AssemblyWriter>,
    script: Mutex<Script>,
    calls: Mutex<Vec<DriverCall>>,
}

impl FakeDriver {
    pub fn new(assembly: AssemblyWriter) -> Self {
        Self {
            assembly: Mutex::new(assembly),
            script: Mutex::new(Script::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_assembly(&self, assembly: AssemblyWriter) {
        *self.assembly.lock() = assembly;
    }

    pub fn fail_synth(&self, message: &str) {
        self.script.lock().synth_failure = Some(message.to_string());
    }

    pub fn fail_deploy(&self, message: &str) {
        self.script.lock().deploy_failure = Some(message.to_string());
    }

    pub fn fail_destroy(&self, message: &str) {
        self.script.lock().destroy_failure = Some(message.to_string());
    }

    /// Outputs written to the outputs file of a deploy
    pub fn set_outputs(&self, outputs: Value) {
        self.script.lock().outputs = Some(outputs);
    }

    /// Watch sessions exit as soon as their outputs are written
    pub fn exit_with_outputs(&self) {
        self.script.lock().exit_with_outputs = true;
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().clone()
    }

    pub fn synth_count(&self) -> usize {
        self.count(|c| matches!(c, DriverCall::Synth(_)))
    }

    pub fn deploys(&self) -> Vec<DeployRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Deploy(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn destroys(&self) -> Vec<DestroyRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Destroy(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&DriverCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: DriverCall) {
        self.calls.lock().push(call);
    }

    fn write_assembly(&self, directory: &Path) -> io::Result<()> {
        let assembly = self.assembly.lock().clone();
        assembly.write(directory)
    }

    fn write_outputs(&self, path: &Path) -> io::Result<()> {
        let outputs = self.script.lock().outputs.clone();
        match outputs {
            Some(outputs) => write_json(path, &outputs),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DeploymentDriver for FakeDriver {
    async fn synth(&self, request: SynthRequest) -> Result<(), DriverError> {
        let output_dir = request.output_dir.clone();
        self.record(DriverCall::Synth(request));
        if let Some(message) = self.script.lock().synth_failure.clone() {
            return Err(DriverError::SynthFailed { message });
        }
        self.write_assembly(&output_dir)
            .map_err(|e| DriverError::SynthFailed { message: e.to_string() })
    }

    async fn deploy(&self, request: DeployRequest) -> Result<(), DriverError> {
        let output_dir: Option<PathBuf> = request.output_dir.clone();
        let outputs_file = request.outputs_file.clone();
        self.record(DriverCall::Deploy(request));
        if let Some(message) = self.script.lock().deploy_failure.clone() {
            return Err(DriverError::DeployFailed { message });
        }
        let failed = |e: io::Error| DriverError::DeployFailed { message: e.to_string() };
        if let Some(dir) = output_dir {
            self.write_assembly(&dir).map_err(failed)?;
        }
        if let Some(file) = outputs_file {
            self.write_outputs(&file).map_err(failed)?;
        }
        Ok(())
    }

    async fn destroy(&self, request: DestroyRequest) -> Result<(), DriverError> {
        self.record(DriverCall::Destroy(request));
        match self.script.lock().destroy_failure.clone() {
            Some(message) => Err(DriverError::DestroyFailed { message }),
            None => Ok(()),
        }
    }

    async fn list_stacks(&self, request: ListRequest) -> Result<Vec<String>, DriverError> {
        self.record(DriverCall::List(request));
        Ok(self.assembly.lock().stack_names())
    }

    async fn watch(&self, request: DeployRequest) -> Result<WatchSession, DriverError> {
        let outputs_file = request.outputs_file.clone();
        let (outputs, linger) = {
            let script = self.script.lock();
            let linger = if script.exit_with_outputs { 0 } else { 1000 };
            (script.outputs.clone(), Duration::from_millis(linger))
        };
        self.record(DriverCall::Watch(request));

        let (tx, output) = mpsc::channel(16);
        let (exit_tx, exit) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(WatchOutput::Stdout("deploying".to_string())).await;
            tokio::time::sleep(Duration::from_millis(200)).await;
            if let (Some(file), Some(outputs)) = (outputs_file, outputs) {
                // rename so watchers never observe a half-written file
                let staged = file.with_extension("tmp");
                if write_json(&staged, &outputs).is_ok() {
                    let _ = fs::rename(&staged, &file);
                }
            }
            tokio::time::sleep(linger).await;
            let _ = tx.send(WatchOutput::Stderr("done".to_string())).await;
            let _ = exit_tx.send(Some(0));
        });
        Ok(WatchSession { output, exit })
    }
}

/// Assertion outputs file content for `stack`
pub fn assertion_outputs(stack: &str, results: &[(&str, &str, Option<&str>)]) -> Value {
    let mut outputs = Map::new();
    for (id, status, message) in results {
        let mut result = json!({"status": status});
        if let Some(message) = message {
            result["message"] = Value::from(*message);
        }
        outputs.insert((*id).to_string(), Value::String(result.to_string()));
    }
    let mut root = Map::new();
    root.insert(stack.to_string(), Value::Object(outputs));
    Value::Object(root)
}
