//! End-to-end runs of frontend, producer and consumer over the memory broker.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use offline_indexer_broker::{MemoryBroker, DEFAULT_CHANNEL};
use offline_indexer_pipeline::{
    ConsumerConfig, InMemoryIndex, IndexConsumer, IndexProducer, MappingError, OfflineIndexer,
    ProducerConfig, RoleState,
};

fn bounded_producer(broker: &MemoryBroker, count: u64) -> Arc<IndexProducer> {
    Arc::new(IndexProducer::with_config(
        shared(broker),
        ProducerConfig::default().with_name("Tom").with_stop_after(count),
    ))
}

fn bounded_consumer(broker: &MemoryBroker, count: u64) -> IndexConsumer {
    IndexConsumer::with_config(
        shared(broker),
        ConsumerConfig::default().with_name("Jerry").with_stop_after(count),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_entity_reaches_drain_only_consumer() {
    let broker = MemoryBroker::new();
    let producer = bounded_producer(&broker, 1);
    let consumer = Arc::new(bounded_consumer(&broker, 1));
    let indexer = OfflineIndexer::new(&producer, person_mapper());

    let consuming = spawn_consumer(&consumer);
    let producing = spawn_producer(&producer);
    indexer.create_entity(&Person::new(1)).unwrap();

    finish(producing).await.unwrap();
    finish(consuming).await.unwrap();

    assert_eq!(producer.sent_count(), 1);
    assert_eq!(producer.unsent_count(), 0);
    assert_eq!(consumer.received_count(), 1);
    assert!(!consumer.indexing_enabled());
    assert_eq!(broker.stats().open_connections, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ten_entities_are_indexed() {
    let broker = MemoryBroker::new();
    let index = Arc::new(InMemoryIndex::new());
    let producer = bounded_producer(&broker, 10);
    let consumer = Arc::new(bounded_consumer(&broker, 10).with_indexer(index.clone()));
    let indexer = OfflineIndexer::new(&producer, person_mapper());

    let before = index.object_count();
    indexer.bulk_create(&people(10)).unwrap();

    let producing = spawn_producer(&producer);
    let consuming = spawn_consumer(&consumer);
    finish(producing).await.unwrap();
    finish(consuming).await.unwrap();

    assert_eq!(index.object_count(), before + 10);
    assert_eq!(consumer.indexing_failures(), 0);
    let stored = index.get("person", "7").unwrap();
    assert_eq!(stored.fields["name"], serde_json::json!("Julian7"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_consumer_bound_is_independent_of_producer() {
    let broker = MemoryBroker::new();
    let producer = bounded_producer(&broker, 10);
    let consumer = Arc::new(bounded_consumer(&broker, 5));
    let indexer = OfflineIndexer::new(&producer, person_mapper());
    indexer.bulk_create(&people(10)).unwrap();

    let producing = spawn_producer(&producer);
    let consuming = spawn_consumer(&consumer);
    finish(producing).await.unwrap();
    finish(consuming).await.unwrap();

    assert_eq!(producer.sent_count(), 10);
    assert_eq!(producer.unsent_count(), 0);
    assert_eq!(consumer.received_count(), 5);
    assert_eq!(consumer.state(), RoleState::Stopped);
    assert_eq!(broker.queued(DEFAULT_CHANNEL), 5);
}

#[tokio::test]
async fn test_bulk_submit_stops_at_first_mapping_failure() {
    let broker = MemoryBroker::new();
    let producer = bounded_producer(&broker, 5);
    let mapper = Arc::new(RejectingMapper::new(3));
    let indexer = OfflineIndexer::new(&producer, mapper.clone());

    let err = indexer.bulk_create(&people(5)).unwrap_err();

    assert!(matches!(err, MappingError::InvalidEntity(_)));
    assert_eq!(indexer.pending(), 2);
    assert_eq!(mapper.calls.load(Ordering::SeqCst), 3);

    let queue = producer.send_queue();
    let first = queue.try_take().unwrap();
    let second = queue.try_take().unwrap();
    assert_eq!(first.descriptor().id.as_deref(), Some("1"));
    assert_eq!(second.descriptor().id.as_deref(), Some("2"));
    assert!(queue.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_submission_order_is_preserved_end_to_end() {
    let broker = MemoryBroker::new();
    let recorder = Arc::new(RecordingIndexer::default());
    let producer = bounded_producer(&broker, 30);
    let consumer = Arc::new(bounded_consumer(&broker, 30).with_indexer(recorder.clone()));
    let indexer = OfflineIndexer::new(&producer, person_mapper());

    let producing = spawn_producer(&producer);
    let consuming = spawn_consumer(&consumer);

    let mut expected = Vec::new();
    for person in people(10) {
        indexer.create_entity(&person).unwrap();
        indexer.update_entity(&person).unwrap();
        indexer.delete_entity(&person).unwrap();
        for op in ["create", "update", "delete"] {
            expected.push(format!("{}:{}", op, person.id));
        }
    }

    finish(producing).await.unwrap();
    finish(consuming).await.unwrap();

    assert_eq!(recorder.applied(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_indexing_failures_do_not_stop_the_consumer() {
    let broker = MemoryBroker::new();
    let index = Arc::new(InMemoryIndex::new());
    let producer = bounded_producer(&broker, 4);
    let consumer = Arc::new(bounded_consumer(&broker, 5).with_indexer(index.clone()));
    let indexer = OfflineIndexer::new(&producer, person_mapper());

    indexer.create_entity(&Person::new(1)).unwrap();
    // Not indexed yet, so the index rejects the update.
    indexer.update_entity(&Person::new(99)).unwrap();
    indexer.create_entity(&Person::new(1)).unwrap();
    indexer.create_entity(&Person::new(2)).unwrap();

    let producing = spawn_producer(&producer);
    finish(producing).await.unwrap();

    send_raw(&broker, b"not an envelope").await;

    let consuming = spawn_consumer(&consumer);
    finish(consuming).await.unwrap();

    assert_eq!(consumer.received_count(), 5);
    assert_eq!(consumer.indexing_failures(), 3);
    assert_eq!(index.object_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transacted_roles_deliver_everything() {
    let broker = MemoryBroker::new();
    let index = Arc::new(InMemoryIndex::new());
    let producer = Arc::new(IndexProducer::with_config(
        shared(&broker),
        ProducerConfig::default()
            .with_transacted(true)
            .with_persistent(true)
            .with_stop_after(3),
    ));
    let consumer = Arc::new(
        IndexConsumer::with_config(
            shared(&broker),
            ConsumerConfig::default()
                .with_transacted(true)
                .with_stop_after(3),
        )
        .with_indexer(index.clone()),
    );
    let indexer = OfflineIndexer::new(&producer, person_mapper());
    indexer.bulk_create_or_update(&people(3)).unwrap();

    let producing = spawn_producer(&producer);
    let consuming = spawn_consumer(&consumer);
    finish(producing).await.unwrap();
    finish(consuming).await.unwrap();

    assert_eq!(index.object_count(), 3);
    assert_eq!(broker.queued(DEFAULT_CHANNEL), 0);
}

async fn send_raw(broker: &MemoryBroker, payload: &[u8]) {
    use offline_indexer_broker::{AckMode, Broker, BrokerMessage, DeliveryOptions};

    let mut connection = broker.connect().await.unwrap();
    let mut session = connection.create_session(false, AckMode::Auto).await.unwrap();
    let mut producer = session.create_producer(DEFAULT_CHANNEL).await.unwrap();
    producer
        .send(BrokerMessage::new(payload.to_vec()), &DeliveryOptions::default())
        .await
        .unwrap();
    producer.close().unwrap();
    session.close().unwrap();
    connection.close().unwrap();
}
