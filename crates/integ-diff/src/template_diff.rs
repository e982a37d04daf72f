//! Structural template diff
//!
//! Compares two templates section by section. `Resources` are compared per
//! logical id and classified with a [`ResourceImpact`]; every other section
//! is compared per entry.

use crate::impact::{property_impact, replacement_kind, ReplacementKind, ResourceImpact};
use integ_assembly::Template;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

const RESOURCES: &str = "Resources";
const PROPERTIES: &str = "Properties";
const TYPE: &str = "Type";
const RETAIN: &str = "Retain";
const RETAIN_POLICIES: [&str; 2] = ["DeletionPolicy", "UpdateReplacePolicy"];

/// Kind of change to an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Only in the new template
    Added,
    /// Only in the old template
    Removed,
    /// In both, with different values
    Modified,
}

impl ChangeKind {
    fn between(old: Option<&Value>, new: Option<&Value>) -> Option<Self> {
        match (old, new) {
            (None, Some(_)) => Some(Self::Added),
            (Some(_), None) => Some(Self::Removed),
            (Some(a), Some(b)) if a != b => Some(Self::Modified),
            _ => None,
        }
    }

    /// Render marker
    #[must_use]
    pub fn marker(self) -> &'static str {
        match self {
            Self::Added => "[+]",
            Self::Removed => "[-]",
            Self::Modified => "[~]",
        }
    }
}

/// Change to one property (or other top-level attribute) of a resource
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDifference {
    /// Property name
    pub name: String,
    /// Kind of change
    pub kind: ChangeKind,
    /// Old value
    pub old: Option<Value>,
    /// New value
    pub new: Option<Value>,
    /// Replacement behavior of the property
    pub replacement: Option<ReplacementKind>,
}

/// Change to one resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDifference {
    /// Logical id
    pub logical_id: String,
    /// Kind of change
    pub kind: ChangeKind,
    /// Type in the old template
    pub old_type: Option<String>,
    /// Type in the new template
    pub new_type: Option<String>,
    /// Changes under `Properties`
    pub property_changes: Vec<PropertyDifference>,
    /// Changes to other attributes (`DependsOn`, `Metadata`, policies)
    pub other_changes: Vec<PropertyDifference>,
    /// Effect of applying the change
    pub impact: ResourceImpact,
}

impl ResourceDifference {
    /// Whether the resource was removed
    #[inline]
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.kind == ChangeKind::Removed
    }

    /// Type to display (new type, else old type)
    #[must_use]
    pub fn display_type(&self) -> &str {
        self.new_type
            .as_deref()
            .or(self.old_type.as_deref())
            .unwrap_or("<unknown>")
    }
}

/// Change to one entry of a non-resource section
#[derive(Debug, Clone, PartialEq)]
pub struct SectionDifference {
    /// Section name
    pub section: String,
    /// Entry key (empty for scalar sections)
    pub key: String,
    /// Kind of change
    pub kind: ChangeKind,
    /// Old value
    pub old: Option<Value>,
    /// New value
    pub new: Option<Value>,
}

/// All differences between two templates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateDiff {
    /// Resource changes, by logical id
    pub resources: Vec<ResourceDifference>,
    /// Other section changes
    pub sections: Vec<SectionDifference>,
}

impl TemplateDiff {
    /// Diff `old` against `new`
    #[must_use]
    pub fn compute(old: &Template, new: &Template) -> Self {
        let old_sections = old.sections();
        let new_sections = new.sections();
        let mut diff = Self::default();

        for section in union_keys(old_sections, new_sections) {
            let a = old_sections.get(section);
            let b = new_sections.get(section);
            if a == b {
                continue;
            }
            if section == RESOURCES {
                diff.resources = diff_resources(as_object(a), as_object(b));
                continue;
            }
            let keyed = a.map_or(true, Value::is_object) && b.map_or(true, Value::is_object);
            if keyed {
                let (ea, eb) = (as_object(a), as_object(b));
                for key in union_keys(&ea, &eb) {
                    if let Some(kind) = ChangeKind::between(ea.get(key), eb.get(key)) {
                        diff.sections.push(SectionDifference {
                            section: section.to_string(),
                            key: key.to_string(),
                            kind,
                            old: ea.get(key).cloned(),
                            new: eb.get(key).cloned(),
                        });
                    }
                }
            } else if let Some(kind) = ChangeKind::between(a, b) {
                diff.sections.push(SectionDifference {
                    section: section.to_string(),
                    key: String::new(),
                    kind,
                    old: a.cloned(),
                    new: b.cloned(),
                });
            }
        }
        diff
    }

    /// Whether there are no differences
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.sections.is_empty()
    }

    /// Number of differences
    #[must_use]
    pub fn difference_count(&self) -> usize {
        self.resources.len() + self.sections.len()
    }
}

fn as_object(value: Option<&Value>) -> Map<String, Value> {
    value
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn union_keys<'a>(a: &'a Map<String, Value>, b: &'a Map<String, Value>) -> BTreeSet<&'a str> {
    a.keys().chain(b.keys()).map(String::as_str).collect()
}

fn resource_type(resource: &Value) -> Option<String> {
    resource.get(TYPE).and_then(Value::as_str).map(str::to_string)
}

fn is_retained(resource: &Value) -> bool {
    RETAIN_POLICIES
        .iter()
        .any(|p| resource.get(*p).and_then(Value::as_str) == Some(RETAIN))
}

fn diff_resources(old: Map<String, Value>, new: Map<String, Value>) -> Vec<ResourceDifference> {
    let mut out = Vec::new();
    for logical_id in union_keys(&old, &new) {
        let a = old.get(logical_id);
        let b = new.get(logical_id);
        let Some(kind) = ChangeKind::between(a, b) else {
            continue;
        };
        out.push(diff_resource(logical_id, kind, a, b));
    }
    out
}

fn diff_resource(
    logical_id: &str,
    kind: ChangeKind,
    old: Option<&Value>,
    new: Option<&Value>,
) -> ResourceDifference {
    let old_type = old.and_then(resource_type);
    let new_type = new.and_then(resource_type);
    let mut property_changes = Vec::new();
    let mut other_changes = Vec::new();

    let impact = match kind {
        ChangeKind::Added => ResourceImpact::WillCreate,
        ChangeKind::Removed => {
            if old.is_some_and(is_retained) {
                ResourceImpact::WillOrphan
            } else {
                ResourceImpact::WillDestroy
            }
        }
        ChangeKind::Modified => {
            let a = old.cloned().unwrap_or(Value::Null);
            let b = new.cloned().unwrap_or(Value::Null);
            let rtype = new_type.clone().unwrap_or_default();

            let props_a = as_object(a.get(PROPERTIES));
            let props_b = as_object(b.get(PROPERTIES));
            let mut impact = ResourceImpact::NoChange;
            for name in union_keys(&props_a, &props_b) {
                if let Some(change) = ChangeKind::between(props_a.get(name), props_b.get(name)) {
                    impact = impact.max(property_impact(&rtype, name));
                    property_changes.push(PropertyDifference {
                        name: name.to_string(),
                        kind: change,
                        old: props_a.get(name).cloned(),
                        new: props_b.get(name).cloned(),
                        replacement: replacement_kind(&rtype, name),
                    });
                }
            }

            let attrs_a = as_object(Some(&a));
            let attrs_b = as_object(Some(&b));
            for name in union_keys(&attrs_a, &attrs_b) {
                if name == PROPERTIES || name == TYPE {
                    continue;
                }
                if let Some(change) = ChangeKind::between(attrs_a.get(name), attrs_b.get(name)) {
                    impact = impact.max(ResourceImpact::WillUpdate);
                    other_changes.push(PropertyDifference {
                        name: name.to_string(),
                        kind: change,
                        old: attrs_a.get(name).cloned(),
                        new: attrs_b.get(name).cloned(),
                        replacement: None,
                    });
                }
            }

            if old_type != new_type {
                impact = ResourceImpact::WillReplace;
            }
            if impact == ResourceImpact::WillReplace && is_retained(&b) {
                impact = ResourceImpact::WillOrphan;
            }
            impact
        }
    };

    ResourceDifference {
        logical_id: logical_id.to_string(),
        kind,
        old_type,
        new_type,
        property_changes,
        other_changes,
        impact,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn template(value: Value) -> Template {
        Template::from_value(value).unwrap()
    }

    #[test]
    fn identical_templates_have_no_diff() {
        let t = template(json!({"Resources": {"R1": {"Type": "X::Y", "Properties": {"P": "v1"}}}}));
        assert!(TemplateDiff::compute(&t, &t).is_empty());
    }

    #[test]
    fn removal_and_addition() {
        let old = template(json!({"Resources": {"R1": {"Type": "AWS::S3::Bucket"}}}));
        let new = template(json!({"Resources": {"R2": {"Type": "AWS::SQS::Queue"}}}));
        let diff = TemplateDiff::compute(&old, &new);
        assert_eq!(diff.resources.len(), 2);
        assert_eq!(diff.resources[0].impact, ResourceImpact::WillDestroy);
        assert!(diff.resources[0].is_removal());
        assert_eq!(diff.resources[1].impact, ResourceImpact::WillCreate);
    }

    #[test]
    fn retained_removal_orphans() {
        let old = template(json!({"Resources": {"R1": {"Type": "AWS::S3::Bucket", "DeletionPolicy": "Retain"}}}));
        let new = template(json!({"Resources": {}}));
        let diff = TemplateDiff::compute(&old, &new);
        assert_eq!(diff.resources[0].impact, ResourceImpact::WillOrphan);
    }

    #[test]
    fn property_impacts() {
        let old = template(json!({"Resources": {
            "B": {"Type": "AWS::S3::Bucket", "Properties": {"BucketName": "a", "Tags": []}},
            "I": {"Type": "AWS::EC2::Instance", "Properties": {"InstanceType": "t3.micro"}},
            "Q": {"Type": "AWS::SQS::Queue", "Properties": {"VisibilityTimeout": 30}}
        }}));
        let new = template(json!({"Resources": {
            "B": {"Type": "AWS::S3::Bucket", "Properties": {"BucketName": "b", "Tags": []}},
            "I": {"Type": "AWS::EC2::Instance", "Properties": {"InstanceType": "t3.large"}},
            "Q": {"Type": "AWS::SQS::Queue", "Properties": {"VisibilityTimeout": 60}}
        }}));
        let diff = TemplateDiff::compute(&old, &new);
        let impacts: Vec<_> = diff.resources.iter().map(|r| (r.logical_id.as_str(), r.impact)).collect();
        assert_eq!(
            impacts,
            vec![
                ("B", ResourceImpact::WillReplace),
                ("I", ResourceImpact::MayReplace),
                ("Q", ResourceImpact::WillUpdate),
            ]
        );
        assert_eq!(diff.resources[0].property_changes.len(), 1);
    }

    #[test]
    fn type_change_replaces_and_retain_orphans() {
        let old = template(json!({"Resources": {"R": {"Type": "AWS::SQS::Queue"}}}));
        let new = template(json!({"Resources": {"R": {"Type": "AWS::SNS::Topic", "UpdateReplacePolicy": "Retain"}}}));
        let diff = TemplateDiff::compute(&old, &new);
        assert_eq!(diff.resources[0].impact, ResourceImpact::WillOrphan);
    }

    #[test]
    fn other_sections_compared_per_entry() {
        let old = template(json!({
            "Parameters": {"A": {"Type": "String"}},
            "Description": "one"
        }));
        let new = template(json!({
            "Parameters": {"A": {"Type": "String"}, "B": {"Type": "Number"}},
            "Description": "two"
        }));
        let diff = TemplateDiff::compute(&old, &new);
        assert_eq!(diff.sections.len(), 2);
        let description = diff.sections.iter().find(|s| s.section == "Description").unwrap();
        assert_eq!(description.kind, ChangeKind::Modified);
        assert!(description.key.is_empty());
        let param = diff.sections.iter().find(|s| s.section == "Parameters").unwrap();
        assert_eq!(param.key, "B");
        assert_eq!(param.kind, ChangeKind::Added);
    }
}
