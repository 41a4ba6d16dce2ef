//! Offline indexer frontend.
//!
//! Presents the indexing operations callers expect while only enqueueing
//! envelopes for the producer. Mapping and validation errors are the only
//! failures a caller sees; everything on the broker side shows up later in
//! the roles' counters and logs.

use std::sync::Arc;

use offline_indexer_shared::{IndexAction, IndexDescriptor, SubmissionEnvelope};
use serde::Serialize;
use tracing::debug;

use super::EntityMapper;
use crate::errors::MappingError;
use crate::producer::IndexProducer;
use crate::queue::SendQueue;

/// Caller-facing indexing API backed by a [`SendQueue`].
///
/// Cheap to clone; clones share the queue and mapper.
#[derive(Clone)]
pub struct OfflineIndexer {
    queue: SendQueue,
    mapper: Arc<dyn EntityMapper>,
}

impl OfflineIndexer {
    /// Create a frontend feeding `producer`'s queue.
    pub fn new(producer: &IndexProducer, mapper: Arc<dyn EntityMapper>) -> Self {
        Self::with_queue(producer.send_queue(), mapper)
    }

    pub fn with_queue(queue: SendQueue, mapper: Arc<dyn EntityMapper>) -> Self {
        Self { queue, mapper }
    }

    /// Envelopes enqueued and not yet taken by the producer.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Validate `descriptor` and enqueue it with `action`.
    ///
    /// # Arguments
    ///
    /// * `action` - The index mutation to request
    /// * `descriptor` - The object to apply it to
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The envelope is queued
    /// * `Err(MappingError::InvalidDescriptor)` - If validation failed; nothing
    ///   was queued
    pub fn submit(&self, action: IndexAction, descriptor: IndexDescriptor) -> Result<(), MappingError> {
        descriptor.validate()?;

        let envelope = SubmissionEnvelope::new(action, descriptor);
        debug!(
            envelope_id = %envelope.envelope_id(),
            action = %action,
            entity_type = %envelope.descriptor().entity_type,
            "Queued submission"
        );
        self.queue.enqueue(envelope);
        Ok(())
    }

    /// Map `entity` through the mapper, then [`submit`](Self::submit) it.
    pub fn submit_entity<E>(&self, action: IndexAction, entity: &E) -> Result<(), MappingError>
    where
        E: Serialize + ?Sized,
    {
        let value = serde_json::to_value(entity)?;
        let descriptor = self.mapper.to_descriptor(value)?;
        self.submit(action, descriptor)
    }

    /// Submit each descriptor in order.
    ///
    /// Stops at the first failure and returns it. Descriptors queued before
    /// the failure stay queued; those after it are not attempted.
    pub fn bulk_submit<I>(&self, action: IndexAction, descriptors: I) -> Result<(), MappingError>
    where
        I: IntoIterator<Item = IndexDescriptor>,
    {
        descriptors
            .into_iter()
            .try_for_each(|descriptor| self.submit(action, descriptor))
    }

    /// Submit each entity in order, with the same partial-submission
    /// behaviour as [`bulk_submit`](Self::bulk_submit).
    pub fn bulk_submit_entities<E>(&self, action: IndexAction, entities: &[E]) -> Result<(), MappingError>
    where
        E: Serialize,
    {
        entities
            .iter()
            .try_for_each(|entity| self.submit_entity(action, entity))
    }

    pub fn create(&self, descriptor: IndexDescriptor) -> Result<(), MappingError> {
        self.submit(IndexAction::Create, descriptor)
    }

    pub fn update(&self, descriptor: IndexDescriptor) -> Result<(), MappingError> {
        self.submit(IndexAction::Update, descriptor)
    }

    pub fn delete(&self, descriptor: IndexDescriptor) -> Result<(), MappingError> {
        self.submit(IndexAction::Delete, descriptor)
    }

    pub fn create_or_update(&self, descriptor: IndexDescriptor) -> Result<(), MappingError> {
        self.submit(IndexAction::CreateOrUpdate, descriptor)
    }

    pub fn create_entity<E: Serialize + ?Sized>(&self, entity: &E) -> Result<(), MappingError> {
        self.submit_entity(IndexAction::Create, entity)
    }

    pub fn update_entity<E: Serialize + ?Sized>(&self, entity: &E) -> Result<(), MappingError> {
        self.submit_entity(IndexAction::Update, entity)
    }

    pub fn delete_entity<E: Serialize + ?Sized>(&self, entity: &E) -> Result<(), MappingError> {
        self.submit_entity(IndexAction::Delete, entity)
    }

    pub fn create_or_update_entity<E: Serialize + ?Sized>(
        &self,
        entity: &E,
    ) -> Result<(), MappingError> {
        self.submit_entity(IndexAction::CreateOrUpdate, entity)
    }

    pub fn bulk_create<E: Serialize>(&self, entities: &[E]) -> Result<(), MappingError> {
        self.bulk_submit_entities(IndexAction::Create, entities)
    }

    pub fn bulk_update<E: Serialize>(&self, entities: &[E]) -> Result<(), MappingError> {
        self.bulk_submit_entities(IndexAction::Update, entities)
    }

    pub fn bulk_delete<E: Serialize>(&self, entities: &[E]) -> Result<(), MappingError> {
        self.bulk_submit_entities(IndexAction::Delete, entities)
    }

    pub fn bulk_create_or_update<E: Serialize>(&self, entities: &[E]) -> Result<(), MappingError> {
        self.bulk_submit_entities(IndexAction::CreateOrUpdate, entities)
    }
}
