//! Indexer service trait definition.

use async_trait::async_trait;
use offline_indexer_shared::{IndexAction, IndexDescriptor};

use crate::errors::IndexError;

/// The index that submissions are ultimately applied to.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the consumer holds one behind an
/// `Arc` for its whole run.
#[async_trait]
pub trait IndexerService: Send + Sync {
    /// Add a new object.
    async fn create(&self, descriptor: &IndexDescriptor) -> Result<(), IndexError>;

    /// Replace an indexed object.
    async fn update(&self, descriptor: &IndexDescriptor) -> Result<(), IndexError>;

    /// Remove an indexed object.
    async fn delete(&self, descriptor: &IndexDescriptor) -> Result<(), IndexError>;

    /// Add the object, replacing it if already indexed.
    async fn create_or_update(&self, descriptor: &IndexDescriptor) -> Result<(), IndexError>;

    /// Dispatch `action` to the matching operation.
    async fn apply(
        &self,
        action: IndexAction,
        descriptor: &IndexDescriptor,
    ) -> Result<(), IndexError> {
        match action {
            IndexAction::Create => self.create(descriptor).await,
            IndexAction::Update => self.update(descriptor).await,
            IndexAction::Delete => self.delete(descriptor).await,
            IndexAction::CreateOrUpdate => self.create_or_update(descriptor).await,
        }
    }
}
