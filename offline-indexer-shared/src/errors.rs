//! Error types for shared data structures.

use thiserror::Error;

/// Errors raised when a descriptor is not indexable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// The descriptor has no entity type.
    #[error("Descriptor has an empty entity type")]
    EmptyEntityType,

    /// The explicit identifier was present but blank.
    #[error("Descriptor for '{entity_type}' has a blank identifier")]
    BlankIdentifier { entity_type: String },
}

/// Errors raised while encoding or decoding an envelope payload.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The envelope could not be serialized.
    #[error("Encode error: {0}")]
    Encode(String),

    /// The payload is not a valid envelope.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl CodecError {
    /// Create an encode error.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}
