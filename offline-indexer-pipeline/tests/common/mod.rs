//! Fixtures shared by the pipeline integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use offline_indexer_broker::{Broker, MemoryBroker};
use offline_indexer_pipeline::{
    EntityMapper, IndexConsumer, IndexError, IndexProducer, IndexerService, JsonEntityMapper,
    MappingError, PipelineError,
};
use offline_indexer_shared::IndexDescriptor;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct Person {
    pub id: u32,
    pub name: String,
}

impl Person {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            name: format!("Julian{}", id),
        }
    }
}

pub fn people(count: u32) -> Vec<Person> {
    (1..=count).map(Person::new).collect()
}

pub fn person_mapper() -> Arc<dyn EntityMapper> {
    Arc::new(JsonEntityMapper::new("person").with_id_field("id"))
}

pub fn shared(broker: &MemoryBroker) -> Arc<dyn Broker> {
    Arc::new(broker.clone())
}

pub fn spawn_producer(producer: &Arc<IndexProducer>) -> JoinHandle<Result<(), PipelineError>> {
    let producer = producer.clone();
    tokio::spawn(async move { producer.run().await })
}

pub fn spawn_consumer(consumer: &Arc<IndexConsumer>) -> JoinHandle<Result<(), PipelineError>> {
    let consumer = consumer.clone();
    tokio::spawn(async move { consumer.run().await })
}

/// Wait for a role task, failing the test if it hangs.
pub async fn finish(handle: JoinHandle<Result<(), PipelineError>>) -> Result<(), PipelineError> {
    tokio::time::timeout(TEST_TIMEOUT, handle)
        .await
        .expect("role did not finish in time")
        .expect("role task panicked")
}

/// Poll `condition` until it holds, failing the test if it never does.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let polling = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(TEST_TIMEOUT, polling)
        .await
        .expect("condition not reached in time");
}

pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("operation did not finish in time")
}

/// Rejects the entity whose `id` matches, counting every call.
pub struct RejectingMapper {
    inner: JsonEntityMapper,
    reject_id: u64,
    pub calls: AtomicUsize,
}

impl RejectingMapper {
    pub fn new(reject_id: u64) -> Self {
        Self {
            inner: JsonEntityMapper::new("person").with_id_field("id"),
            reject_id,
            calls: AtomicUsize::new(0),
        }
    }
}

impl EntityMapper for RejectingMapper {
    fn to_descriptor(&self, entity: Value) -> Result<IndexDescriptor, MappingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if entity.get("id").and_then(Value::as_u64) == Some(self.reject_id) {
            return Err(MappingError::invalid_entity(format!(
                "person {} cannot be indexed",
                self.reject_id
            )));
        }
        self.inner.to_descriptor(entity)
    }
}

/// Records the order operations are applied in.
#[derive(Default)]
pub struct RecordingIndexer {
    pub applied: Mutex<Vec<String>>,
}

impl RecordingIndexer {
    fn record(&self, op: &str, descriptor: &IndexDescriptor) -> Result<(), IndexError> {
        let id = descriptor.id.clone().unwrap_or_default();
        self.applied.lock().unwrap().push(format!("{}:{}", op, id));
        Ok(())
    }

    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl IndexerService for RecordingIndexer {
    async fn create(&self, descriptor: &IndexDescriptor) -> Result<(), IndexError> {
        self.record("create", descriptor)
    }

    async fn update(&self, descriptor: &IndexDescriptor) -> Result<(), IndexError> {
        self.record("update", descriptor)
    }

    async fn delete(&self, descriptor: &IndexDescriptor) -> Result<(), IndexError> {
        self.record("delete", descriptor)
    }

    async fn create_or_update(&self, descriptor: &IndexDescriptor) -> Result<(), IndexError> {
        self.record("upsert", descriptor)
    }
}

/// Fails every operation, as during an indexing outage.
#[derive(Default)]
pub struct FailingIndexer {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl IndexerService for FailingIndexer {
    async fn create(&self, _descriptor: &IndexDescriptor) -> Result<(), IndexError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(IndexError::backend("index is offline"))
    }

    async fn update(&self, descriptor: &IndexDescriptor) -> Result<(), IndexError> {
        self.create(descriptor).await
    }

    async fn delete(&self, descriptor: &IndexDescriptor) -> Result<(), IndexError> {
        self.create(descriptor).await
    }

    async fn create_or_update(&self, descriptor: &IndexDescriptor) -> Result<(), IndexError> {
        self.create(descriptor).await
    }
}
