//! # Offline Indexer
//!
//! Entry point and configuration for running the offline indexer roles.

pub mod config;

pub use config::{BridgeConfig, Dependencies};

use thiserror::Error;

/// Errors that can occur while configuring or running the indexer.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A producer or consumer run failed.
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] offline_indexer_pipeline::PipelineError),

    /// A submission was rejected.
    #[error("Mapping error: {0}")]
    MappingError(#[from] offline_indexer_pipeline::MappingError),

    /// Broker setup failed.
    #[error("Broker error: {0}")]
    BrokerError(#[from] offline_indexer_broker::BrokerError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl BridgeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
