//! Asset hash canonicalization
//!
//! Asset content hashes change whenever asset sources change, which would
//! make every template referencing an asset differ from its snapshot. Before
//! diffing, every known hash is replaced with a stable `Asset<N>` placeholder
//! numbered by first appearance in the template.

use indexmap::IndexMap;
use integ_assembly::AssetId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static LEGACY_ASSET_PARAMETER: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^AssetParameters([a-zA-Z0-9]{64})(S3Bucket|S3VersionKey|ArtifactHash)([a-zA-Z0-9]{8})$")
        .ok()
});

/// Substitution table built for one template
#[derive(Debug, Default)]
struct Substitutions {
    numbers: IndexMap<String, usize>,
    parameters: Vec<(String, String)>,
}

impl Substitutions {
    fn number_for(&mut self, hash: &str) -> usize {
        let next = self.numbers.len() + 1;
        *self.numbers.entry(hash.to_string()).or_insert(next)
    }

    fn build(template: &Value, assets: &[AssetId]) -> Self {
        let mut table = Self::default();

        if let (Some(re), Some(parameters)) = (
            LEGACY_ASSET_PARAMETER.as_ref(),
            template.get("Parameters").and_then(Value::as_object),
        ) {
            for name in parameters.keys() {
                let Some(captures) = re.captures(name) else {
                    continue;
                };
                let number = table.number_for(&captures[1]);
                table
                    .parameters
                    .push((name.clone(), format!("Asset{number}{}", &captures[2])));
            }
        }

        for asset in assets {
            table.number_for(asset.as_str());
        }
        table
    }

    fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (from, to) in &self.parameters {
            if out.contains(from.as_str()) {
                out = out.replace(from.as_str(), to);
            }
        }
        for (hash, number) in &self.numbers {
            if !hash.is_empty() && out.contains(hash.as_str()) {
                out = out.replace(hash.as_str(), &format!("Asset{number}Hash"));
            }
        }
        out
    }

    fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    fn rewrite(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.apply(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.rewrite(v)).collect()),
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, v) in map {
                    out.insert(self.apply(key), self.rewrite(v));
                }
                Value::Object(out)
            }
            other => other.clone(),
        }
    }
}

/// Replace asset hashes in `template` with stable placeholders
///
/// Legacy `AssetParameters<hash><Field><suffix>` parameters become
/// `Asset<N><Field>`, and any other occurrence of a legacy hash or of one of
/// `assets` becomes `Asset<N>Hash`. Object keys are rewritten like values.
#[must_use]
pub fn canonicalize_template(template: &Value, assets: &[AssetId]) -> Value {
    let table = Substitutions::build(template, assets);
    if table.is_empty() {
        return template.clone();
    }
    tracing::trace!(assets = table.numbers.len(), "canonicalizing asset hashes");
    table.rewrite(template)
}
