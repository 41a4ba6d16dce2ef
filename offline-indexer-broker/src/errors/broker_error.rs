//! Broker error types.
//!
//! Every failure the broker capability can report. None of these are
//! retried by the offline indexer: a broker error ends the role that saw it.

use thiserror::Error;

/// Errors that can occur while talking to the message broker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Failed to establish a connection to the broker.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Failed to create or use a session.
    #[error("Session error: {0}")]
    SessionError(String),

    /// Failed to send a message.
    #[error("Send error: {0}")]
    SendError(String),

    /// Failed to receive a message.
    #[error("Receive error: {0}")]
    ReceiveError(String),

    /// Failed to commit a transacted session.
    #[error("Commit error: {0}")]
    CommitError(String),

    /// Failed to acknowledge a message.
    #[error("Acknowledge error: {0}")]
    AcknowledgeError(String),

    /// The durable client identity was rejected.
    #[error("Invalid client id: {0}")]
    InvalidClientId(String),

    /// The resource was used after it was closed.
    #[error("Closed: {0}")]
    Closed(String),

    /// The connection reported an asynchronous fault.
    #[error("Connection fault: {0}")]
    Fault(String),

    /// The broker client configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl BrokerError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a session error.
    pub fn session(msg: impl Into<String>) -> Self {
        Self::SessionError(msg.into())
    }

    /// Create a send error.
    pub fn send(msg: impl Into<String>) -> Self {
        Self::SendError(msg.into())
    }

    /// Create a receive error.
    pub fn receive(msg: impl Into<String>) -> Self {
        Self::ReceiveError(msg.into())
    }

    /// Create a commit error.
    pub fn commit(msg: impl Into<String>) -> Self {
        Self::CommitError(msg.into())
    }

    /// Create an acknowledge error.
    pub fn acknowledge(msg: impl Into<String>) -> Self {
        Self::AcknowledgeError(msg.into())
    }

    /// Create a closed-resource error.
    pub fn closed(msg: impl Into<String>) -> Self {
        Self::Closed(msg.into())
    }

    /// Create a connection fault.
    pub fn fault(msg: impl Into<String>) -> Self {
        Self::Fault(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
