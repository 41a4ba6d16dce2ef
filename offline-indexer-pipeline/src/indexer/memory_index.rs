//! In-memory index.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use offline_indexer_shared::IndexDescriptor;
use tracing::debug;

use super::IndexerService;
use crate::errors::IndexError;

type IndexKey = (String, String);

/// An [`IndexerService`] that keeps indexed objects in a map keyed by
/// entity type and identifier.
#[derive(Default)]
pub struct InMemoryIndex {
    objects: Mutex<HashMap<IndexKey, IndexDescriptor>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<IndexKey, IndexDescriptor>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of indexed objects.
    pub fn object_count(&self) -> usize {
        self.objects().len()
    }

    pub fn get(&self, entity_type: &str, id: &str) -> Option<IndexDescriptor> {
        self.objects()
            .get(&(entity_type.to_string(), id.to_string()))
            .cloned()
    }

    fn key(descriptor: &IndexDescriptor) -> Result<IndexKey, IndexError> {
        descriptor
            .index_key()
            .ok_or_else(|| IndexError::MissingIdentifier {
                entity_type: descriptor.entity_type.clone(),
            })
    }
}

fn describe(key: &IndexKey) -> String {
    format!("{}#{}", key.0, key.1)
}

#[async_trait]
impl IndexerService for InMemoryIndex {
    async fn create(&self, descriptor: &IndexDescriptor) -> Result<(), IndexError> {
        let key = Self::key(descriptor)?;
        let mut objects = self.objects();
        if objects.contains_key(&key) {
            return Err(IndexError::AlreadyExists(describe(&key)));
        }
        debug!(object = %describe(&key), "Indexed object");
        objects.insert(key, descriptor.clone());
        Ok(())
    }

    async fn update(&self, descriptor: &IndexDescriptor) -> Result<(), IndexError> {
        let key = Self::key(descriptor)?;
        match self.objects().get_mut(&key) {
            Some(existing) => {
                *existing = descriptor.clone();
                Ok(())
            }
            None => Err(IndexError::NotFound(describe(&key))),
        }
    }

    async fn delete(&self, descriptor: &IndexDescriptor) -> Result<(), IndexError> {
        let key = Self::key(descriptor)?;
        self.objects()
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| IndexError::NotFound(describe(&key)))
    }

    async fn create_or_update(&self, descriptor: &IndexDescriptor) -> Result<(), IndexError> {
        let key = Self::key(descriptor)?;
        self.objects().insert(key, descriptor.clone());
        Ok(())
    }
}
