//! Content-addressed asset identifiers
//!
//! Provides [`AssetId`], the key an assembly uses to reference an
//! out-of-band artifact (file bundle or container image) from a template.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Length of a sha256 content hash rendered as hex
pub const CONTENT_HASH_HEX_LEN: usize = 64;

/// Identifier of an asset referenced by a stack
///
/// Most asset ids are the hex-encoded sha256 of the asset source, but the
/// manifest format allows arbitrary strings, so no shape is enforced here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Create a new asset id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is a 64 character hex content hash
    #[must_use]
    pub fn is_content_hash(&self) -> bool {
        is_content_hash(&self.0)
    }

    /// Short form for log output (first 12 characters)
    #[must_use]
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(12)
            .map_or(self.0.len(), |(idx, _)| idx);
        &self.0[..end]
    }
}

impl Display for AssetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AssetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for AssetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check whether `candidate` is a 64 character hex string
#[must_use]
pub fn is_content_hash(candidate: &str) -> bool {
    candidate.len() == CONTENT_HASH_HEX_LEN && hex::decode(candidate).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "1f2e3d4c5b6a79881f2e3d4c5b6a79881f2e3d4c5b6a79881f2e3d4c5b6a7988";

    #[test]
    fn content_hash_detection() {
        assert!(is_content_hash(HASH));
        assert!(!is_content_hash(&HASH[..63]));
        assert!(!is_content_hash("zz2e3d4c5b6a79881f2e3d4c5b6a79881f2e3d4c5b6a79881f2e3d4c5b6a7988"));
    }

    #[test]
    fn asset_id_short() {
        let id = AssetId::new(HASH);
        assert_eq!(id.short(), "1f2e3d4c5b6a");
        assert_eq!(AssetId::new("abc").short(), "abc");
    }

    #[test]
    fn asset_id_serde_transparent() {
        let id = AssetId::new(HASH);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{HASH}\""));
        let back: AssetId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(back.is_content_hash());
    }
}
