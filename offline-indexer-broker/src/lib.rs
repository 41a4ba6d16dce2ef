//! # Offline Indexer Broker
//!
//! This crate defines the broker capability set the offline indexer is
//! written against (connect, sessions, producers, consumers, commit and
//! acknowledgement) and ships two implementations:
//!
//! - [`memory::MemoryBroker`]: an in-process broker, used for tests and for
//!   running both roles inside one process.
//! - `kafka::KafkaBroker` (behind the `kafka` feature): an adapter over
//!   rdkafka.

pub mod errors;
pub mod interfaces;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
mod sync;
pub mod types;

pub use errors::BrokerError;
pub use interfaces::{
    Broker, BrokerConnection, BrokerSession, FaultListener, MessageConsumer, MessageProducer,
};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaBroker, KafkaBrokerConfig};
pub use memory::{MemoryBroker, MemoryBrokerStats};
pub use types::{AckMode, BrokerMessage, DeliveryMode, DeliveryOptions, Receipt, DEFAULT_CHANNEL};
