//! Signature reference identifiers.

use std::fmt;

use uuid::Uuid;

/// Correlates the SignedProperties reference with its digest entry inside a
/// signature. Canonical 8-4-4-4-12 UUID v4 text, unique per signing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceId(String);

impl ReferenceId {
    /// Draws a fresh identifier from the process RNG.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_canonical_grouping() {
        let id = ReferenceId::generate();
        let text = id.as_str();
        assert_eq!(text.len(), 36);
        for (i, c) in text.chars().enumerate() {
            match i {
                8 | 13 | 18 | 23 => assert_eq!(c, '-', "separator expected at {i} in {text}"),
                _ => assert!(c.is_ascii_hexdigit(), "hex digit expected at {i} in {text}"),
            }
        }
    }

    #[test]
    fn carries_v4_version_and_variant() {
        let id = ReferenceId::generate();
        let bytes = id.as_str().as_bytes();
        assert_eq!(bytes[14], b'4');
        assert!(matches!(bytes[19], b'8' | b'9' | b'a' | b'b'));
    }

    #[test]
    fn does_not_collide_in_practice() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(ReferenceId::generate()));
        }
    }
}
