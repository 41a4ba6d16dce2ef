//! Submission envelopes.
//!
//! One envelope is one broker message: the requested action and the
//! descriptor it applies to. Envelopes are immutable once built.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::IndexAction;
use crate::descriptor::IndexDescriptor;
use crate::errors::CodecError;

/// Version of the envelope wire format.
pub const ENVELOPE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WireEnvelope {
    version: u32,
    envelope_id: Uuid,
    submitted_at: DateTime<Utc>,
    action: IndexAction,
    descriptor: IndexDescriptor,
}

/// An action paired with the descriptor it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionEnvelope {
    envelope_id: Uuid,
    submitted_at: DateTime<Utc>,
    action: IndexAction,
    descriptor: IndexDescriptor,
}

impl SubmissionEnvelope {
    /// Wrap a descriptor with the action to perform on it.
    pub fn new(action: IndexAction, descriptor: IndexDescriptor) -> Self {
        Self {
            envelope_id: Uuid::new_v4(),
            submitted_at: Utc::now(),
            action,
            descriptor,
        }
    }

    pub fn envelope_id(&self) -> Uuid {
        self.envelope_id
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn action(&self) -> IndexAction {
        self.action
    }

    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    /// Take the action and descriptor out of the envelope.
    pub fn into_parts(self) -> (IndexAction, IndexDescriptor) {
        (self.action, self.descriptor)
    }

    /// Serialize the envelope into a message payload.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let wire = WireEnvelope {
            version: ENVELOPE_VERSION,
            envelope_id: self.envelope_id,
            submitted_at: self.submitted_at,
            action: self.action,
            descriptor: self.descriptor.clone(),
        };

        serde_json::to_vec(&wire).map_err(|e| CodecError::encode(e.to_string()))
    }

    /// Decode an envelope from a message payload.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let wire: WireEnvelope = serde_json::from_slice(payload)
            .map_err(|e| CodecError::decode(format!("Failed to decode envelope: {}", e)))?;

        if wire.version != ENVELOPE_VERSION {
            return Err(CodecError::decode(format!(
                "Unsupported envelope version {}",
                wire.version
            )));
        }

        Ok(Self {
            envelope_id: wire.envelope_id,
            submitted_at: wire.submitted_at,
            action: wire.action,
            descriptor: wire.descriptor,
        })
    }
}
