//! Error types for the definition model

/// Errors loading or encoding a form definition
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    /// Input was not a JSON document matching the definition shape
    #[error("malformed form definition: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Hash input had the wrong length
    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidHashLength { expected: usize, actual: usize },

    /// Hash string was not hex
    #[error("invalid hash encoding: {0}")]
    InvalidHashEncoding(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_display() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = DefinitionError::from(err);
        assert!(err.to_string().starts_with("malformed form definition"));
    }

    #[test]
    fn hash_length_display() {
        let err = DefinitionError::InvalidHashLength {
            expected: 32,
            actual: 3,
        };
        assert_eq!(err.to_string(), "invalid hash length: expected 32, got 3");
    }
}
