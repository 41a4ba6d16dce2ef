//! Startup, shutdown, fault and acknowledgement behaviour of the roles.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use offline_indexer_broker::{AckMode, BrokerError, MemoryBroker, DEFAULT_CHANNEL};
use offline_indexer_pipeline::{
    ConsumerConfig, IndexConsumer, IndexProducer, OfflineIndexer, PipelineError, ProducerConfig,
    RoleState,
};

#[tokio::test]
async fn test_producer_bound_holds_after_later_enqueue() {
    let broker = MemoryBroker::new();
    let producer = Arc::new(IndexProducer::with_config(
        shared(&broker),
        ProducerConfig::default().with_stop_after(2),
    ));
    let indexer = OfflineIndexer::new(&producer, person_mapper());
    indexer.bulk_create(&people(2)).unwrap();

    finish(spawn_producer(&producer)).await.unwrap();
    indexer.create_entity(&Person::new(3)).unwrap();

    assert_eq!(producer.state(), RoleState::Stopped);
    assert_eq!(producer.sent_count(), 2);
    assert_eq!(producer.unsent_count(), 1);
    assert!(matches!(
        producer.run().await,
        Err(PipelineError::InvalidState(_))
    ));
    assert_eq!(producer.sent_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_stops_idle_roles_and_is_idempotent() {
    let broker = MemoryBroker::new();
    let producer = Arc::new(IndexProducer::new(shared(&broker)));
    let consumer = Arc::new(IndexConsumer::new(shared(&broker)));

    let producing = spawn_producer(&producer);
    let consuming = spawn_consumer(&consumer);
    wait_until(|| broker.stats().open_clients == 2).await;
    assert!(consumer.is_running());

    producer.shutdown();
    producer.shutdown();
    consumer.shutdown();
    consumer.shutdown();

    finish(producing).await.unwrap();
    finish(consuming).await.unwrap();

    producer.shutdown();
    consumer.shutdown();
    assert_eq!(producer.state(), RoleState::Stopped);
    assert_eq!(consumer.state(), RoleState::Stopped);
    assert!(!consumer.is_running());
    assert_eq!(broker.stats().open_connections, 0);
    assert_eq!(broker.stats().open_sessions, 0);
    assert_eq!(broker.stats().open_clients, 0);
}

#[tokio::test]
async fn test_unreachable_broker_is_fatal_at_startup() {
    let broker = MemoryBroker::new();
    broker.set_available(false);
    let consumer = IndexConsumer::new(shared(&broker));

    let err = within(consumer.run()).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Broker(BrokerError::ConnectionError(_))
    ));
    assert_eq!(consumer.state(), RoleState::Failed);
    assert_eq!(consumer.received_count(), 0);
}

#[tokio::test]
async fn test_send_failure_is_fatal_and_loses_the_dequeued_envelope() {
    let broker = MemoryBroker::new();
    let producer = IndexProducer::new(shared(&broker));
    let indexer = OfflineIndexer::new(&producer, person_mapper());
    indexer.bulk_create(&people(3)).unwrap();
    broker.fail_next_sends(1);

    let err = within(producer.run()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Broker(BrokerError::SendError(_))));
    assert_eq!(producer.state(), RoleState::Failed);
    assert_eq!(producer.sent_count(), 0);
    assert_eq!(producer.unsent_count(), 2);
    assert_eq!(broker.queued(DEFAULT_CHANNEL), 0);
    assert_eq!(broker.stats().open_connections, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connection_fault_stops_consumer() {
    let broker = MemoryBroker::new();
    let consumer = Arc::new(IndexConsumer::new(shared(&broker)));

    let consuming = spawn_consumer(&consumer);
    wait_until(|| broker.stats().open_clients == 1).await;
    broker.inject_fault("network partition");

    let err = finish(consuming).await.unwrap_err();

    assert!(matches!(err, PipelineError::Fault(ref reason) if reason.contains("network partition")));
    assert!(!consumer.is_running());
    assert_eq!(consumer.state(), RoleState::Failed);
    assert_eq!(broker.stats().open_clients, 0);
    assert_eq!(broker.stats().open_connections, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_closed_channel_ends_the_consumer() {
    let broker = MemoryBroker::new();
    let producer = Arc::new(IndexProducer::with_config(
        shared(&broker),
        ProducerConfig::default().with_stop_after(2),
    ));
    let consumer = Arc::new(IndexConsumer::new(shared(&broker)));
    OfflineIndexer::new(&producer, person_mapper())
        .bulk_create(&people(2))
        .unwrap();

    finish(spawn_producer(&producer)).await.unwrap();
    broker.close_channel(DEFAULT_CHANNEL);
    finish(spawn_consumer(&consumer)).await.unwrap();

    assert_eq!(consumer.received_count(), 2);
    assert_eq!(consumer.state(), RoleState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_indexing_is_still_acknowledged() {
    let broker = MemoryBroker::new();
    let failing = Arc::new(FailingIndexer::default());
    let producer = Arc::new(IndexProducer::with_config(
        shared(&broker),
        ProducerConfig::default().with_stop_after(2),
    ));
    let consumer = Arc::new(
        IndexConsumer::with_config(
            shared(&broker),
            ConsumerConfig::default()
                .with_ack_mode(AckMode::Client)
                .with_stop_after(2),
        )
        .with_indexer(failing.clone()),
    );
    OfflineIndexer::new(&producer, person_mapper())
        .bulk_create(&people(2))
        .unwrap();

    finish(spawn_producer(&producer)).await.unwrap();
    finish(spawn_consumer(&consumer)).await.unwrap();

    assert_eq!(failing.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(consumer.received_count(), 2);
    assert_eq!(consumer.indexing_failures(), 2);
    // Acknowledged, so nothing is redelivered when the session closes.
    assert_eq!(broker.queued(DEFAULT_CHANNEL), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplicate_durable_identity_is_rejected() {
    let broker = MemoryBroker::new();
    let config = ConsumerConfig::default().with_durable_client_id("jerry");
    let first = Arc::new(IndexConsumer::with_config(shared(&broker), config.clone()));
    let second = IndexConsumer::with_config(shared(&broker), config);

    let consuming = spawn_consumer(&first);
    wait_until(|| broker.stats().open_clients == 1).await;

    let err = within(second.run()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Broker(BrokerError::InvalidClientId(_))
    ));

    first.shutdown();
    finish(consuming).await.unwrap();
    assert_eq!(broker.stats().open_connections, 0);
}
