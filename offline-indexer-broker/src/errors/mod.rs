//! Error types for broker operations.

mod broker_error;

pub use broker_error::BrokerError;
