use offline_indexer_shared::DescriptorError;
use thiserror::Error;

/// A submission that cannot be turned into an indexable descriptor.
///
/// This is the only error a caller of `OfflineIndexer` ever sees.
#[derive(Error, Debug)]
pub enum MappingError {
    /// The entity has no indexable representation.
    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    /// The descriptor failed validation.
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorError),

    /// The entity could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MappingError {
    /// Create an invalid entity error.
    pub fn invalid_entity(msg: impl Into<String>) -> Self {
        Self::InvalidEntity(msg.into())
    }
}

impl From<serde_json::Error> for MappingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
