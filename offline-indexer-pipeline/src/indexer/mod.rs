//! The indexing capability the consumer applies envelopes to.

mod indexer_service;
mod memory_index;

pub use indexer_service::IndexerService;
pub use memory_index::InMemoryIndex;
