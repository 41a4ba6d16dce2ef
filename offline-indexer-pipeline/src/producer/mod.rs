//! The sending role: drains the send queue onto the broker channel.

mod index_producer;

pub use index_producer::{IndexProducer, ProducerConfig};
