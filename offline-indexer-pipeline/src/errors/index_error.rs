use thiserror::Error;

/// Errors reported by an indexing capability.
///
/// The consumer logs these and moves on; they never stop a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// The descriptor has no identifier to index it under.
    #[error("Descriptor for '{entity_type}' has no identifier")]
    MissingIdentifier { entity_type: String },

    /// Create was requested for an object that is already indexed.
    #[error("Already indexed: {0}")]
    AlreadyExists(String),

    /// Update or delete was requested for an object that is not indexed.
    #[error("Not indexed: {0}")]
    NotFound(String),

    /// The index refused the object.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The index backend failed.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl IndexError {
    /// Create a rejection error.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Create a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}
