use offline_indexer_broker::BrokerError;
use offline_indexer_shared::CodecError;
use thiserror::Error;

/// Errors that end a producer or consumer run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The broker failed to connect, send, receive or settle a message.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// An envelope could not be encoded for sending.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The broker reported an asynchronous connection fault.
    #[error("Connection fault: {0}")]
    Fault(String),

    /// The role was asked to do something its lifecycle does not allow.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl PipelineError {
    /// Create a connection fault error.
    pub fn fault(msg: impl Into<String>) -> Self {
        Self::Fault(msg.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}
