//! # Offline Indexer Shared
//!
//! Data types shared by every part of the offline indexer: the index
//! actions a caller can request, the descriptor of an indexable object, and
//! the envelope that carries one of each across the broker.

pub mod action;
pub mod descriptor;
pub mod envelope;
pub mod errors;

pub use action::IndexAction;
pub use descriptor::IndexDescriptor;
pub use envelope::{SubmissionEnvelope, ENVELOPE_VERSION};
pub use errors::{CodecError, DescriptorError};
