//! Rendered template model
//!
//! Templates are arbitrary JSON trees; [`Template`] wraps the root object and
//! offers the few typed accessors the diff engine and the reader need.

use serde_json::{Map, Value};

/// Resource type of a nested stack
pub const NESTED_STACK_TYPE: &str = "AWS::CloudFormation::Stack";

/// Resource metadata key naming the file backing an asset
pub const ASSET_PATH_METADATA_KEY: &str = "aws:asset:path";

/// Suffix of nested stack template files
pub const NESTED_TEMPLATE_SUFFIX: &str = ".nested.template.json";

/// A rendered template (root must be a JSON object)
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    body: Value,
}

impl Template {
    /// Wrap a JSON value, rejecting non-object roots
    ///
    /// # Errors
    /// Returns a description of the offending shape if `body` is not an object
    pub fn from_value(body: Value) -> Result<Self, String> {
        if body.is_object() {
            Ok(Self { body })
        } else {
            Err(format!("template root must be an object, found {}", kind_of(&body)))
        }
    }

    /// Parse template text
    ///
    /// # Errors
    /// Returns the JSON error message or a shape error
    pub fn parse(text: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
        Self::from_value(value)
    }

    /// Root JSON value
    #[inline]
    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Consume into root JSON value
    #[inline]
    #[must_use]
    pub fn into_body(self) -> Value {
        self.body
    }

    /// Root object
    #[must_use]
    pub fn sections(&self) -> &Map<String, Value> {
        // from_value guarantees an object root
        match self.body.as_object() {
            Some(map) => map,
            None => empty_map(),
        }
    }

    /// Resources section, if present and an object
    #[must_use]
    pub fn resources(&self) -> Option<&Map<String, Value>> {
        self.body.get("Resources").and_then(Value::as_object)
    }

    /// Single resource by logical id
    #[must_use]
    pub fn resource(&self, logical_id: &str) -> Option<&Value> {
        self.resources().and_then(|r| r.get(logical_id))
    }

    /// Type of a resource by logical id
    #[must_use]
    pub fn resource_type(&self, logical_id: &str) -> Option<&str> {
        self.resource(logical_id)
            .and_then(|r| r.get("Type"))
            .and_then(Value::as_str)
    }

    /// Parameter names declared by the template
    #[must_use]
    pub fn parameter_names(&self) -> Vec<&str> {
        self.body
            .get("Parameters")
            .and_then(Value::as_object)
            .map(|p| p.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// File names of nested stack templates referenced by this template
    ///
    /// Only resources of type `AWS::CloudFormation::Stack` whose asset path
    /// metadata names a nested template file are returned, in resource order.
    #[must_use]
    pub fn nested_template_files(&self) -> Vec<String> {
        let Some(resources) = self.resources() else {
            return Vec::new();
        };
        resources
            .values()
            .filter(|r| r.get("Type").and_then(Value::as_str) == Some(NESTED_STACK_TYPE))
            .filter_map(|r| {
                r.get("Metadata")
                    .and_then(|m| m.get(ASSET_PATH_METADATA_KEY))
                    .and_then(Value::as_str)
            })
            .filter(|path| path.ends_with(NESTED_TEMPLATE_SUFFIX))
            .map(str::to_string)
            .collect()
    }
}

/// A template slot in a snapshot assembly
///
/// A template that cannot be read as the expected tree shape is kept as
/// `Invalid` so the diff engine can report it rather than abort.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateEntry {
    /// Parsed template
    Valid(Template),
    /// Unreadable or malformed template
    Invalid { reason: String },
}

impl TemplateEntry {
    /// Build an entry from raw template text
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        match Template::parse(text) {
            Ok(t) => Self::Valid(t),
            Err(reason) => Self::Invalid { reason },
        }
    }

    /// Borrow the template if valid
    #[inline]
    #[must_use]
    pub fn as_template(&self) -> Option<&Template> {
        match self {
            Self::Valid(t) => Some(t),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<Template> for TemplateEntry {
    fn from(value: Template) -> Self {
        Self::Valid(value)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn empty_map() -> &'static Map<String, Value> {
    static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
    EMPTY.get_or_init(Map::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_non_object_root() {
        assert!(Template::from_value(json!([1, 2])).is_err());
        assert!(Template::parse("\"text\"").is_err());
        assert!(Template::parse("{not json").is_err());
    }

    #[test]
    fn resource_accessors() {
        let t = Template::from_value(json!({
            "Parameters": {"P1": {"Type": "String"}},
            "Resources": {"R1": {"Type": "AWS::S3::Bucket"}}
        }))
        .unwrap();
        assert_eq!(t.resource_type("R1"), Some("AWS::S3::Bucket"));
        assert_eq!(t.resource_type("R2"), None);
        assert_eq!(t.parameter_names(), vec!["P1"]);
        assert_eq!(t.sections().len(), 2);
    }

    #[test]
    fn nested_template_files_only_for_nested_stacks() {
        let t = Template::from_value(json!({
            "Resources": {
                "Nested": {
                    "Type": "AWS::CloudFormation::Stack",
                    "Metadata": {"aws:asset:path": "StackANested1234.nested.template.json"}
                },
                "Fn": {
                    "Type": "AWS::Lambda::Function",
                    "Metadata": {"aws:asset:path": "asset.abc"}
                }
            }
        }))
        .unwrap();
        assert_eq!(
            t.nested_template_files(),
            vec!["StackANested1234.nested.template.json".to_string()]
        );
    }

    #[test]
    fn entry_from_text() {
        assert!(TemplateEntry::from_text("{}").as_template().is_some());
        assert!(matches!(
            TemplateEntry::from_text("[]"),
            TemplateEntry::Invalid { .. }
        ));
    }
}
