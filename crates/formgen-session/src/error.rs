//! Error types for session state

use formgen_definition::DefinitionError;

/// Session layer errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A stored session value does not have the expected shape
    #[error("session value '{key}' is malformed: {source}")]
    MalformedValue {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A definition could not be encoded or hashed
    #[error("definition error: {0}")]
    Definition(#[from] DefinitionError),
}

impl SessionError {
    /// Create malformed-value error for key
    pub fn malformed(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::MalformedValue {
            key: key.into(),
            source,
        }
    }
}
