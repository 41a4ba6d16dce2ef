//! Broker capability traits.
//!
//! The capability set is deliberately small: connect, create a session,
//! create a producer or consumer bound to a channel, send, receive, commit
//! and acknowledge. Resource release is synchronous so it can run from
//! scope guards on every exit path.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::BrokerError;
use crate::types::{AckMode, BrokerMessage, DeliveryOptions};

/// Entry point to a message broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a new connection.
    ///
    /// # Returns
    ///
    /// * `Ok(connection)` - A started connection
    /// * `Err(BrokerError::ConnectionError)` - If the broker is unreachable
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError>;
}

/// Observer of asynchronous connection-level faults.
///
/// Faults are reported from outside the code that is using the connection,
/// so implementations must only record the fault and return.
pub trait FaultListener: Send + Sync {
    fn on_fault(&self, error: &BrokerError);
}

/// An open broker connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Set the durable client identity. Must happen before sessions are
    /// created; a broker rejects an identity already in use.
    fn set_client_id(&mut self, client_id: &str) -> Result<(), BrokerError>;

    /// Register the observer notified of connection faults, replacing any
    /// previous one.
    fn set_fault_listener(&mut self, listener: Arc<dyn FaultListener>);

    /// Create a session.
    ///
    /// # Arguments
    ///
    /// * `transacted` - Whether sends and receives are settled by `commit`
    /// * `ack_mode` - Acknowledgement mode for non-transacted sessions
    async fn create_session(
        &self,
        transacted: bool,
        ack_mode: AckMode,
    ) -> Result<Box<dyn BrokerSession>, BrokerError>;

    /// Release the connection. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), BrokerError>;
}

/// A unit of work on a connection.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    fn is_transacted(&self) -> bool;

    fn ack_mode(&self) -> AckMode;

    /// Create a producer that sends to `channel`.
    async fn create_producer(&self, channel: &str)
        -> Result<Box<dyn MessageProducer>, BrokerError>;

    /// Create a consumer that receives from `channel`.
    async fn create_consumer(&self, channel: &str)
        -> Result<Box<dyn MessageConsumer>, BrokerError>;

    /// Commit everything sent and received since the last commit.
    ///
    /// Fails with `BrokerError::SessionError` on a non-transacted session.
    async fn commit(&self) -> Result<(), BrokerError>;

    /// Release the session. Uncommitted work is rolled back. Calling it
    /// again is a no-op.
    fn close(&mut self) -> Result<(), BrokerError>;
}

/// Sends messages to one channel.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    async fn send(
        &self,
        message: BrokerMessage,
        options: &DeliveryOptions,
    ) -> Result<(), BrokerError>;

    /// Release the producer. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), BrokerError>;
}

/// Receives messages from one channel.
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Wait for the next message.
    ///
    /// Cancelling the returned future before it completes never loses a
    /// message.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(message))` - The next message
    /// * `Ok(None)` - The channel was closed
    /// * `Err(BrokerError)` - If receiving failed
    async fn receive(&mut self) -> Result<Option<BrokerMessage>, BrokerError>;

    /// Acknowledge a received message, and with it every earlier message
    /// this consumer's session received. A no-op unless the session uses
    /// client acknowledgement.
    async fn acknowledge(&self, message: &BrokerMessage) -> Result<(), BrokerError>;

    /// Release the consumer. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), BrokerError>;
}
