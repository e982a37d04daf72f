//! Test case model
//!
//! Field names follow the camelCase `integ.json` schema so a declared
//! manifest deserializes directly into [`TestCase`].

use serde::{Deserialize, Serialize};

/// One named scenario inside a test suite
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// Stacks deployed by this case
    pub stacks: Vec<String>,
    /// Construct path of the assertion stack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion_stack: Option<String>,
    /// Artifact id of the assertion stack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion_stack_name: Option<String>,
    /// Per-case options
    #[serde(flatten)]
    pub options: TestOptions,
}

impl TestCase {
    /// Create case for stacks
    #[must_use]
    pub fn new<I, S>(stacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stacks: stacks.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the assertion stack
    #[must_use]
    pub fn with_assertion_stack(
        mut self,
        path: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.assertion_stack = Some(path.into());
        self.assertion_stack_name = Some(name.into());
        self
    }

    /// Set the options
    #[must_use]
    pub fn with_options(mut self, options: TestOptions) -> Self {
        self.options = options;
        self
    }

    /// Whether `stack` belongs to this case
    #[must_use]
    pub fn contains_stack(&self, stack: &str) -> bool {
        self.stacks.iter().any(|s| s == stack)
    }
}

/// Options shared by test cases
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOptions {
    /// Deploy the snapshot code before the new code (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_update_workflow: Option<bool>,
    /// Compare asset hashes instead of canonicalizing them (default false)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_assets: Option<bool>,
    /// Resource types that may be destroyed or replaced without a finding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_destroy: Option<Vec<String>>,
    /// Shell hooks around deploy and destroy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Hooks>,
    /// Per-action deploy/destroy settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdk_command_options: Option<CdkCommandOptions>,
}

impl TestOptions {
    /// Whether the update workflow is enabled
    #[inline]
    #[must_use]
    pub fn update_workflow_enabled(&self) -> bool {
        self.stack_update_workflow.unwrap_or(true)
    }

    /// Whether asset hashes are diffed verbatim
    #[inline]
    #[must_use]
    pub fn diff_assets(&self) -> bool {
        self.diff_assets.unwrap_or(false)
    }

    /// Resource types allowed to be destroyed
    #[must_use]
    pub fn allow_destroy(&self) -> &[String] {
        self.allow_destroy.as_deref().unwrap_or_default()
    }

    /// Whether `resource_type` is allow-listed for destruction
    #[must_use]
    pub fn allows_destroy_of(&self, resource_type: &str) -> bool {
        self.allow_destroy().iter().any(|t| t == resource_type)
    }

    /// Hooks, or an empty set
    #[must_use]
    pub fn hooks(&self) -> Hooks {
        self.hooks.clone().unwrap_or_default()
    }

    fn command(&self, action: CommandAction) -> Option<&CommandOptions> {
        let options = self.cdk_command_options.as_ref()?;
        match action {
            CommandAction::Deploy => options.deploy.as_ref(),
            CommandAction::Destroy => options.destroy.as_ref(),
        }
    }

    /// Whether the deploy action runs (default true)
    #[must_use]
    pub fn deploy_enabled(&self) -> bool {
        self.command(CommandAction::Deploy)
            .and_then(|c| c.enabled)
            .unwrap_or(true)
    }

    /// Whether the destroy action runs (default true)
    #[must_use]
    pub fn destroy_enabled(&self) -> bool {
        self.command(CommandAction::Destroy)
            .and_then(|c| c.enabled)
            .unwrap_or(true)
    }

    /// Error expectation for an action
    #[must_use]
    pub fn expectation(&self, action: CommandAction) -> ErrorExpectation {
        self.command(action)
            .map(|c| ErrorExpectation {
                expect_error: c.expect_error.unwrap_or(false),
                expected_message: c.expected_message.clone(),
            })
            .unwrap_or_default()
    }
}

/// Shell commands run around deploy and destroy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hooks {
    /// Before deploy
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_deploy: Vec<String>,
    /// After deploy
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_deploy: Vec<String>,
    /// Before destroy
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_destroy: Vec<String>,
    /// After destroy
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_destroy: Vec<String>,
}

/// Deploy/destroy settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CdkCommandOptions {
    /// Deploy settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<CommandOptions>,
    /// Destroy settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destroy: Option<CommandOptions>,
}

/// Settings of one action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOptions {
    /// Whether the action runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Whether the action is expected to fail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_error: Option<bool>,
    /// Pattern the failure message must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_message: Option<String>,
}

/// Mutating action a test case performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandAction {
    /// Deploy stacks
    Deploy,
    /// Destroy stacks
    Destroy,
}

impl std::fmt::Display for CommandAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deploy => f.write_str("deploy"),
            Self::Destroy => f.write_str("destroy"),
        }
    }
}

/// Whether an action is expected to fail, and how
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorExpectation {
    /// The action is expected to fail
    pub expect_error: bool,
    /// Pattern the failure message must match
    pub expected_message: Option<String>,
}

impl ErrorExpectation {
    /// Expect any failure
    #[must_use]
    pub fn any() -> Self {
        Self {
            expect_error: true,
            expected_message: None,
        }
    }

    /// Expect a failure matching `pattern`
    #[must_use]
    pub fn matching(pattern: impl Into<String>) -> Self {
        Self {
            expect_error: true,
            expected_message: Some(pattern.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn defaults_when_absent() {
        let case: TestCase = serde_json::from_value(json!({"stacks": ["A"]})).unwrap();
        assert!(case.options.update_workflow_enabled());
        assert!(!case.options.diff_assets());
        assert!(case.options.allow_destroy().is_empty());
        assert!(case.options.deploy_enabled());
        assert!(case.options.destroy_enabled());
        assert_eq!(
            case.options.expectation(CommandAction::Deploy),
            ErrorExpectation::default()
        );
    }

    #[test]
    fn camel_case_fields() {
        let case: TestCase = serde_json::from_value(json!({
            "stacks": ["A"],
            "assertionStack": "Test/DeployAssert",
            "assertionStackName": "TestDeployAssertE3C9C8F7",
            "stackUpdateWorkflow": false,
            "diffAssets": true,
            "allowDestroy": ["AWS::S3::Bucket"],
            "hooks": {"preDeploy": ["echo hi"]},
            "cdkCommandOptions": {
                "deploy": {"expectError": true, "expectedMessage": "already exists"},
                "destroy": {"enabled": false}
            }
        }))
        .unwrap();
        assert_eq!(case.assertion_stack_name.as_deref(), Some("TestDeployAssertE3C9C8F7"));
        assert!(!case.options.update_workflow_enabled());
        assert!(case.options.diff_assets());
        assert!(case.options.allows_destroy_of("AWS::S3::Bucket"));
        assert_eq!(case.options.hooks().pre_deploy, vec!["echo hi".to_string()]);
        assert!(!case.options.destroy_enabled());
        assert_eq!(
            case.options.expectation(CommandAction::Deploy),
            ErrorExpectation::matching("already exists")
        );
    }

    #[test]
    fn serializes_without_empty_fields() {
        let case = TestCase::new(["A", "B"]);
        assert_eq!(serde_json::to_value(&case).unwrap(), json!({"stacks": ["A", "B"]}));
    }
}
