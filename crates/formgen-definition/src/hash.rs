//! Content addressing for form definitions
//!
//! A [`DefinitionHash`] identifies the exact body of a definition. TempForms
//! carry one so commit attempts for the same content can be recognised.

use crate::error::DefinitionError;
use crate::model::FormDefinition;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte Blake3 hash over the canonical JSON encoding of a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DefinitionHash([u8; 32]);

impl DefinitionHash {
    /// Create hash from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DefinitionError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| DefinitionError::InvalidHashLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Blake3 of arbitrary bytes
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash a definition
    ///
    /// Struct fields encode in declaration order and unknown-field maps are
    /// sorted, so equal definitions always hash equal.
    ///
    /// # Errors
    /// Returns error if the definition cannot be encoded
    pub fn of(definition: &FormDefinition) -> Result<Self, DefinitionError> {
        let json = serde_json::to_vec(definition)?;
        Ok(Self::compute(&json))
    }

    /// First 16 hex chars
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for DefinitionHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for DefinitionHash {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl serde::Serialize for DefinitionHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for DefinitionHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FormDefinition {
        FormDefinition::from_json_str(
            r#"{"name":"Apply","pages":[{"path":"/a","title":"A","components":[]}]}"#,
        )
        .unwrap()
    }

    #[test]
    fn equal_definitions_hash_equal() {
        assert_eq!(
            DefinitionHash::of(&sample()).unwrap(),
            DefinitionHash::of(&sample()).unwrap()
        );
    }

    #[test]
    fn changed_definition_changes_hash() {
        let mut other = sample();
        other.name = Some("Renew".to_string());
        assert_ne!(
            DefinitionHash::of(&sample()).unwrap(),
            DefinitionHash::of(&other).unwrap()
        );
    }

    #[test]
    fn display_parses_back() {
        let hash = DefinitionHash::compute(b"form");
        let parsed: DefinitionHash = hash.to_string().parse().unwrap();
        assert_eq!(hash, parsed);
        assert!(hash.to_string().starts_with(&hash.short()));
    }

    #[test]
    fn rejects_short_input() {
        let result = DefinitionHash::from_slice(&[0u8; 5]);
        assert!(matches!(
            result,
            Err(DefinitionError::InvalidHashLength { expected: 32, actual: 5 })
        ));
    }

    #[test]
    fn serde_uses_hex_string() {
        let hash = DefinitionHash::compute(b"form");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json.len(), 66);
        let decoded: DefinitionHash = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, hash);
    }
}
