//! Interface definitions for the broker capability.
//!
//! The offline indexer only talks to a broker through these traits, so the
//! in-memory broker and the Kafka adapter are interchangeable.

mod broker;

pub use broker::{
    Broker, BrokerConnection, BrokerSession, FaultListener, MessageConsumer, MessageProducer,
};
