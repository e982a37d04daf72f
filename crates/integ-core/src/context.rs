//! Fixed synth context
//!
//! Every synth runs against the same placeholder account, region and lookup
//! answers so snapshots never depend on the machine that produced them.

use crate::driver::SynthContext;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Placeholder account id
pub const DUMMY_ACCOUNT: &str = "12345678";

/// Placeholder region
pub const DUMMY_REGION: &str = "test-region";

/// Placeholder VPC id returned by the VPC provider answer
pub const DUMMY_VPC_ID: &str = "vpc-60900905";

/// Placeholder AMI id returned by every SSM AMI lookup
pub const DUMMY_AMI: &str = "ami-1234";

/// Context key disabling version reporting in synthesized templates
pub const VERSION_REPORTING_KEY: &str = "aws:cdk:version-reporting";

const SSM_AMI_PARAMETERS: [&str; 4] = [
    "/aws/service/ami-amazon-linux-latest/amzn-ami-hvm-x86_64-gp2",
    "/aws/service/ami-amazon-linux-latest/amzn2-ami-hvm-x86_64-gp2",
    "/aws/service/ami-amazon-linux-latest/al2022-ami-kernel-5.15-x86_64",
    "/aws/service/ami-amazon-linux-latest/al2023-ami-kernel-6.1-x86_64",
];

/// Environment passed to every synth
#[must_use]
pub fn dummy_env() -> BTreeMap<String, String> {
    [
        ("CDK_INTEG_ACCOUNT", DUMMY_ACCOUNT),
        ("CDK_INTEG_REGION", DUMMY_REGION),
        ("CDK_INTEG_HOSTED_ZONE_ID", "Z23ABC4XYZL05B"),
        ("CDK_INTEG_HOSTED_ZONE_NAME", "example.com"),
        ("CDK_INTEG_DOMAIN_NAME", "*.example.com"),
        (
            "CDK_INTEG_CERT_ARN",
            "arn:aws:acm:test-region:12345678:certificate/86468209-a272-595d-b831-0efb6421265z",
        ),
        ("CDK_INTEG_SUBNET_ID", "subnet-0dff1a399d8f6f92c"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Lookup answers passed to every synth
#[must_use]
pub fn dummy_context() -> SynthContext {
    let scope = format!("account={DUMMY_ACCOUNT}:region={DUMMY_REGION}");
    let mut context = SynthContext::new();

    context.insert(
        format!("availability-zones:{scope}"),
        json!([
            format!("{DUMMY_REGION}-1a"),
            format!("{DUMMY_REGION}-1b"),
            format!("{DUMMY_REGION}-1c"),
        ]),
    );
    for parameter in SSM_AMI_PARAMETERS {
        context.insert(
            format!("ssm:{scope}:parameterName={parameter}"),
            Value::from(DUMMY_AMI),
        );
    }
    context.insert(
        format!("vpc-provider:{scope}:filter.isDefault=true"),
        json!({
            "vpcId": DUMMY_VPC_ID,
            "vpcCidrBlock": "10.0.0.0/16",
            "availabilityZones": [],
            "subnetGroups": [
                {
                    "name": "Public",
                    "type": "Public",
                    "subnets": [
                        {
                            "subnetId": "subnet-0000000000000000a",
                            "availabilityZone": format!("{DUMMY_REGION}-1a"),
                            "routeTableId": "rtb-0000000000000000a",
                            "cidr": "10.0.0.0/24"
                        }
                    ]
                }
            ]
        }),
    );
    context.insert(VERSION_REPORTING_KEY.to_string(), Value::Bool(false));
    context
}

/// Dummy context overlaid with string overrides
///
/// Later maps win; legacy pragmas are passed before the suite's declared
/// synth context.
#[must_use]
pub fn merged_context<'a, I>(overrides: I) -> SynthContext
where
    I: IntoIterator<Item = &'a BTreeMap<String, String>>,
{
    let mut context = dummy_context();
    for map in overrides {
        for (key, value) in map {
            context.insert(key.clone(), Value::from(value.as_str()));
        }
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_stable_between_calls() {
        assert_eq!(dummy_context(), dummy_context());
        assert_eq!(dummy_env(), dummy_env());
    }

    #[test]
    fn ami_lookups_resolve_to_placeholder() {
        let context = dummy_context();
        let amis: Vec<_> = context
            .iter()
            .filter(|(k, _)| k.starts_with("ssm:"))
            .map(|(_, v)| v.clone())
            .collect();
        assert_eq!(amis.len(), SSM_AMI_PARAMETERS.len());
        assert!(amis.iter().all(|v| v == DUMMY_AMI));
    }

    #[test]
    fn vpc_answer_uses_placeholder_id() {
        let context = dummy_context();
        let vpc = context
            .iter()
            .find(|(k, _)| k.starts_with("vpc-provider:"))
            .map(|(_, v)| v)
            .unwrap();
        assert_eq!(vpc["vpcId"], DUMMY_VPC_ID);
    }

    #[test]
    fn later_overrides_win() {
        let legacy = BTreeMap::from([("feature".to_string(), "old".to_string())]);
        let declared = BTreeMap::from([("feature".to_string(), "new".to_string())]);
        let context = merged_context([&legacy, &declared]);
        assert_eq!(context["feature"], "new");
        assert!(context.contains_key(VERSION_REPORTING_KEY));
    }
}
