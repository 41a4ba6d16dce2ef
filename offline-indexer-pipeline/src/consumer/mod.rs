//! The receiving role: applies envelopes from the broker channel to the
//! index.

mod fault;
mod index_consumer;

pub use index_consumer::{ConsumerConfig, IndexConsumer};
