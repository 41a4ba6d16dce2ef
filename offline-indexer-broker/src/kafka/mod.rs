//! Kafka implementation of the broker capability.
//!
//! A channel maps to a topic. Sessions map onto Kafka as follows:
//!
//! - transacted producer sessions use Kafka transactions, committed by
//!   `BrokerSession::commit`
//! - transacted and client-acknowledge consumer sessions disable auto
//!   commit and commit offsets on `commit` / `acknowledge`
//! - auto and dups-ok sessions use librdkafka's auto commit
//!
//! Kafka has no per-message time-to-live, so the expiry is carried in a
//! header and enforced when receiving.

mod client;
mod context;

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{BaseProducer, Producer};
use tracing::{info, instrument};

use crate::errors::BrokerError;
use crate::interfaces::{Broker, BrokerConnection};

pub use client::{KafkaConnection, KafkaConsumer, KafkaProducer, KafkaSession};

/// Default Kafka consumer group when no durable client id is set.
const DEFAULT_GROUP_ID: &str = "offline-indexer";

/// Connection settings for [`KafkaBroker`].
#[derive(Debug, Clone)]
pub struct KafkaBrokerConfig {
    /// Kafka broker addresses (comma-separated).
    pub brokers: String,
    /// Consumer group used when no durable client id is configured.
    pub group_id: String,
    /// How long to wait for cluster metadata when connecting.
    pub connect_timeout: Duration,
    /// How long a send may wait in the local queue and for delivery.
    pub message_timeout: Duration,
    /// How long transaction and commit calls may block.
    pub transaction_timeout: Duration,
}

impl KafkaBrokerConfig {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            ..Self::default()
        }
    }

    pub(crate) fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.brokers);
        config
    }
}

impl Default for KafkaBrokerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: DEFAULT_GROUP_ID.to_string(),
            connect_timeout: Duration::from_secs(5),
            message_timeout: Duration::from_secs(5),
            transaction_timeout: Duration::from_secs(10),
        }
    }
}

/// Broker backed by a Kafka cluster.
pub struct KafkaBroker {
    config: KafkaBrokerConfig,
}

impl KafkaBroker {
    pub fn new(config: KafkaBrokerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Broker for KafkaBroker {
    /// Connect by fetching cluster metadata, so an unreachable cluster fails
    /// here rather than on the first send.
    #[instrument(skip(self), fields(brokers = %self.config.brokers))]
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        let probe: BaseProducer = self
            .config
            .client_config()
            .create()
            .map_err(|e| BrokerError::config(e.to_string()))?;

        let timeout = self.config.connect_timeout;
        tokio::task::spawn_blocking(move || probe.client().fetch_metadata(None, timeout))
            .await
            .map_err(|e| BrokerError::connection(e.to_string()))?
            .map_err(|e| BrokerError::connection(format!("Kafka unreachable: {}", e)))?;

        info!("Connected to Kafka");
        Ok(Box::new(KafkaConnection::new(self.config.clone())))
    }
}
