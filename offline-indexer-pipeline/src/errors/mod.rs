//! Error types for the offline indexer pipeline.

mod index_error;
mod mapping_error;
mod pipeline_error;

pub use index_error::IndexError;
pub use mapping_error::MappingError;
pub use pipeline_error::PipelineError;
