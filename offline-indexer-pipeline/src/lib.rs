//! # Offline Indexer Pipeline
//!
//! Lets callers submit index mutations without waiting for the index.
//!
//! ## Architecture
//!
//! ```text
//! caller → OfflineIndexer → SendQueue → IndexProducer → broker channel
//!        → IndexConsumer → IndexerService
//! ```
//!
//! 1. **Frontend** ([`OfflineIndexer`]): maps and validates the submission
//!    and enqueues it. Never touches the broker.
//! 2. **Producer** ([`IndexProducer`]): drains the queue in order, one
//!    message per envelope.
//! 3. **Consumer** ([`IndexConsumer`]): receives envelopes and applies them
//!    to the index, logging indexing failures without stopping.
//!
//! Producer and consumer share nothing but the channel name and can run in
//! different processes.

pub mod consumer;
pub mod errors;
pub mod frontend;
pub mod indexer;
pub mod producer;
pub mod queue;
mod resources;
mod role;

pub use consumer::{ConsumerConfig, IndexConsumer};
pub use errors::{IndexError, MappingError, PipelineError};
pub use frontend::{EntityMapper, JsonEntityMapper, OfflineIndexer};
pub use indexer::{InMemoryIndex, IndexerService};
pub use producer::{IndexProducer, ProducerConfig};
pub use queue::SendQueue;
pub use role::RoleState;
