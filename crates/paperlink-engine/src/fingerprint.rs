use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Deterministic cache key: SHA-256 (hex) over the normalized request inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn builder(kind: &str) -> FingerprintBuilder {
        FingerprintBuilder::new(kind)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Feeds named fields into the digest. Names and values are separated by
/// control bytes, so `("ab", "c")` and `("a", "bc")` hash differently.
pub struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    fn new(kind: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"paperlink/v1\x1f");
        hasher.update(kind.as_bytes());
        hasher.update(b"\x1e");
        Self { hasher }
    }

    pub fn field(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.hasher.update(name.as_bytes());
        self.hasher.update(b"\x1f");
        self.hasher.update(value.to_string().as_bytes());
        self.hasher.update(b"\x1e");
        self
    }

    /// Like [`field`](Self::field), with whitespace trimmed and collapsed first.
    pub fn text(self, name: &str, text: &str) -> Self {
        let normalized = collapse_whitespace(text);
        self.field(name, normalized)
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint(format!("{:x}", self.hasher.finalize()))
    }
}

/// Trim and collapse every whitespace run into a single space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_give_identical_fingerprints() {
        let a = Fingerprint::builder("extract")
            .text("excerpt", "Deep   learning\n for images ")
            .field("model", "deepseek-chat")
            .finish();
        let b = Fingerprint::builder("extract")
            .text("excerpt", "Deep learning for images")
            .field("model", "deepseek-chat")
            .finish();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn any_parameter_change_changes_the_fingerprint() {
        let base = || Fingerprint::builder("extract").text("excerpt", "same text");
        let a = base().field("temperature", 0.1).finish();
        let b = base().field("temperature", 0.2).finish();
        let c = Fingerprint::builder("translate")
            .text("excerpt", "same text")
            .field("temperature", 0.1)
            .finish();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let a = Fingerprint::builder("k").field("ab", "c").finish();
        let b = Fingerprint::builder("k").field("a", "bc").finish();
        assert_ne!(a, b);
    }
}
