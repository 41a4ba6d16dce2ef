//! Dependency initialization and wiring for the offline indexer.

use std::sync::Arc;

use offline_indexer_broker::{Broker, MemoryBroker};
use offline_indexer_pipeline::{
    InMemoryIndex, IndexConsumer, IndexProducer, JsonEntityMapper, OfflineIndexer,
};
use tracing::info;

use super::BridgeConfig;

/// Entity type the binary indexes.
const ENTITY_TYPE: &str = "person";

/// Field lifted into the descriptor identifier.
const ID_FIELD: &str = "id";

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub producer: Arc<IndexProducer>,
    pub consumer: Arc<IndexConsumer>,
    /// Frontend feeding the producer's queue.
    pub indexer: OfflineIndexer,
    /// Index the consumer applies envelopes to.
    pub index: Arc<InMemoryIndex>,
}

impl Dependencies {
    /// Wire both roles to `broker`.
    pub fn new(config: &BridgeConfig, broker: Arc<dyn Broker>) -> Self {
        let producer = Arc::new(IndexProducer::with_config(
            broker.clone(),
            config.producer_config("Tom"),
        ));

        let index = Arc::new(InMemoryIndex::new());
        let consumer = Arc::new(
            IndexConsumer::with_config(broker, config.consumer_config("Jerry"))
                .with_indexer(index.clone()),
        );

        let mapper = Arc::new(JsonEntityMapper::new(ENTITY_TYPE).with_id_field(ID_FIELD));
        let indexer = OfflineIndexer::new(&producer, mapper);

        info!(
            channel = %config.channel,
            stop_after_sent = config.stop_after_sent,
            stop_after_received = config.stop_after_received,
            "Dependencies initialized"
        );

        Self {
            producer,
            consumer,
            indexer,
            index,
        }
    }

    /// Wire both roles to a fresh in-process broker.
    pub fn in_memory(config: &BridgeConfig) -> Self {
        info!("Using in-memory broker");
        Self::new(config, Arc::new(MemoryBroker::new()))
    }

    /// Wire both roles to the Kafka cluster at `KAFKA_BROKER`.
    #[cfg(feature = "kafka")]
    pub fn kafka(config: &BridgeConfig) -> Self {
        use offline_indexer_broker::{KafkaBroker, KafkaBrokerConfig};

        info!(kafka_broker = %config.kafka_broker, "Using Kafka broker");
        let broker = KafkaBroker::new(KafkaBrokerConfig::new(config.kafka_broker.clone()));
        Self::new(config, Arc::new(broker))
    }
}
