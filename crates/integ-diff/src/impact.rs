//! Resource change impact
//!
//! Classifies how applying a resource difference would affect the deployed
//! resource, using a built-in table of properties whose change forces (or
//! may force) a replacement.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

/// Effect of applying a resource difference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceImpact {
    /// No effect
    NoChange,
    /// In-place update
    WillUpdate,
    /// New resource
    WillCreate,
    /// Replacement depending on the new value
    MayReplace,
    /// Replacement
    WillReplace,
    /// Removed from the stack but retained in the account
    WillOrphan,
    /// Deleted
    WillDestroy,
}

impl ResourceImpact {
    /// Tag written into manifests and rendered diffs
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::NoChange => "NO_CHANGE",
            Self::WillUpdate => "WILL_UPDATE",
            Self::WillCreate => "WILL_CREATE",
            Self::MayReplace => "MAY_REPLACE",
            Self::WillReplace => "WILL_REPLACE",
            Self::WillOrphan => "WILL_ORPHAN",
            Self::WillDestroy => "WILL_DESTROY",
        }
    }

    /// Whether the impact risks data loss or a new physical resource
    #[must_use]
    pub fn is_destructive(self) -> bool {
        matches!(
            self,
            Self::MayReplace | Self::WillReplace | Self::WillOrphan | Self::WillDestroy
        )
    }
}

impl Display for ResourceImpact {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A flagged resource-level change
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestructiveChange {
    /// Impact classification
    pub impact: ResourceImpact,
    /// Logical id of the resource
    pub logical_id: String,
    /// Template the resource belongs to
    pub stack_name: String,
}

impl Display for DestructiveChange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.stack_name, self.logical_id, self.impact)
    }
}

/// How a property change affects the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplacementKind {
    /// Always replaces
    Always,
    /// Replaces for some values
    Conditional,
}

use ReplacementKind::{Always, Conditional};

static REPLACEMENT_PROPERTIES: Lazy<HashMap<&'static str, Vec<(&'static str, ReplacementKind)>>> =
    Lazy::new(|| {
        HashMap::from([
            ("AWS::S3::Bucket", vec![("BucketName", Always), ("ObjectLockEnabled", Always)]),
            (
                "AWS::DynamoDB::Table",
                vec![
                    ("TableName", Always),
                    ("KeySchema", Always),
                    ("LocalSecondaryIndexes", Always),
                    ("AttributeDefinitions", Conditional),
                ],
            ),
            ("AWS::SQS::Queue", vec![("QueueName", Always), ("FifoQueue", Always)]),
            ("AWS::SNS::Topic", vec![("TopicName", Always), ("FifoTopic", Always)]),
            (
                "AWS::Lambda::Function",
                vec![("FunctionName", Always), ("PackageType", Always)],
            ),
            ("AWS::IAM::Role", vec![("RoleName", Always), ("Path", Always)]),
            ("AWS::IAM::User", vec![("UserName", Always), ("Path", Conditional)]),
            (
                "AWS::EC2::VPC",
                vec![("CidrBlock", Always), ("InstanceTenancy", Conditional)],
            ),
            (
                "AWS::EC2::Subnet",
                vec![("CidrBlock", Always), ("VpcId", Always), ("AvailabilityZone", Always)],
            ),
            (
                "AWS::EC2::SecurityGroup",
                vec![("GroupName", Always), ("GroupDescription", Always), ("VpcId", Always)],
            ),
            (
                "AWS::EC2::Instance",
                vec![
                    ("ImageId", Always),
                    ("AvailabilityZone", Always),
                    ("SubnetId", Always),
                    ("InstanceType", Conditional),
                    ("UserData", Conditional),
                ],
            ),
            (
                "AWS::RDS::DBInstance",
                vec![
                    ("DBInstanceIdentifier", Always),
                    ("DBName", Always),
                    ("StorageEncrypted", Always),
                    ("Engine", Conditional),
                    ("AvailabilityZone", Conditional),
                ],
            ),
            ("AWS::Logs::LogGroup", vec![("LogGroupName", Always)]),
            ("AWS::ECR::Repository", vec![("RepositoryName", Always)]),
            ("AWS::Kinesis::Stream", vec![("Name", Always)]),
            ("AWS::ECS::Cluster", vec![("ClusterName", Always)]),
            (
                "AWS::ECS::TaskDefinition",
                vec![
                    ("ContainerDefinitions", Always),
                    ("Family", Always),
                    ("Cpu", Always),
                    ("Memory", Always),
                    ("NetworkMode", Always),
                ],
            ),
            ("AWS::Events::Rule", vec![("Name", Always)]),
            (
                "AWS::StepFunctions::StateMachine",
                vec![("StateMachineName", Always), ("StateMachineType", Always)],
            ),
            (
                "AWS::EFS::FileSystem",
                vec![("Encrypted", Always), ("KmsKeyId", Always), ("PerformanceMode", Always)],
            ),
        ])
    });

/// Replacement behavior of `property` on `resource_type`, if any
#[must_use]
pub fn replacement_kind(resource_type: &str, property: &str) -> Option<ReplacementKind> {
    REPLACEMENT_PROPERTIES
        .get(resource_type)?
        .iter()
        .find(|(name, _)| *name == property)
        .map(|(_, kind)| *kind)
}

/// Impact of changing `property` on `resource_type`
#[must_use]
pub fn property_impact(resource_type: &str, property: &str) -> ResourceImpact {
    match replacement_kind(resource_type, property) {
        Some(Always) => ResourceImpact::WillReplace,
        Some(Conditional) => ResourceImpact::MayReplace,
        None => ResourceImpact::WillUpdate,
    }
}
