//! The caller-facing indexing API.

mod mapper;
mod offline_indexer;

pub use mapper::{EntityMapper, JsonEntityMapper};
pub use offline_indexer::OfflineIndexer;
