//! The local send queue.
//!
//! An unbounded FIFO shared by every caller and the producer. Enqueue never
//! blocks; `take` waits for the next envelope.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use offline_indexer_shared::SubmissionEnvelope;
use tokio::sync::Notify;

#[derive(Default)]
struct QueueInner {
    items: Mutex<VecDeque<SubmissionEnvelope>>,
    notify: Notify,
}

/// Insertion-ordered queue of envelopes waiting to be sent.
///
/// Cloning yields another handle to the same queue. Any number of threads
/// may enqueue; a single producer takes.
#[derive(Clone, Default)]
pub struct SendQueue {
    inner: Arc<QueueInner>,
}

impl SendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<SubmissionEnvelope>> {
        self.inner
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an envelope and wake the producer.
    pub fn enqueue(&self, envelope: SubmissionEnvelope) {
        self.items().push_back(envelope);
        self.inner.notify.notify_one();
    }

    /// Remove the oldest envelope without waiting.
    pub fn try_take(&self) -> Option<SubmissionEnvelope> {
        self.items().pop_front()
    }

    /// Wait for and remove the oldest envelope.
    ///
    /// Cancel safe: dropping the future never loses an envelope.
    pub async fn take(&self) -> SubmissionEnvelope {
        loop {
            if let Some(envelope) = self.try_take() {
                return envelope;
            }
            self.inner.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offline_indexer_shared::{IndexAction, IndexDescriptor};
    use std::time::Duration;

    fn envelope(id: usize) -> SubmissionEnvelope {
        SubmissionEnvelope::new(
            IndexAction::Create,
            IndexDescriptor::new("person").with_id(id.to_string()),
        )
    }

    fn id_of(envelope: &SubmissionEnvelope) -> String {
        envelope.descriptor().id.clone().unwrap()
    }

    #[tokio::test]
    async fn test_take_returns_envelopes_in_insertion_order() {
        let queue = SendQueue::new();
        for i in 0..5 {
            queue.enqueue(envelope(i));
        }
        assert_eq!(queue.len(), 5);

        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(id_of(&queue.take().await));
        }

        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_take_wakes_on_later_enqueue() {
        let queue = SendQueue::new();
        let handle = queue.clone();

        let waiter = tokio::spawn(async move { handle.take().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(envelope(42));

        let taken = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id_of(&taken), "42");
    }

    #[tokio::test]
    async fn test_cancelled_take_loses_nothing() {
        let queue = SendQueue::new();

        let timed_out = tokio::time::timeout(Duration::from_millis(10), queue.take()).await;
        assert!(timed_out.is_err());

        queue.enqueue(envelope(1));
        assert_eq!(id_of(&queue.take().await), "1");
    }

    #[test]
    fn test_concurrent_callers_keep_their_own_order() {
        let queue = SendQueue::new();

        let callers: Vec<_> = (0..4)
            .map(|caller| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        queue.enqueue(SubmissionEnvelope::new(
                            IndexAction::Create,
                            IndexDescriptor::new(format!("caller-{}", caller))
                                .with_id(i.to_string()),
                        ));
                    }
                })
            })
            .collect();
        for caller in callers {
            caller.join().unwrap();
        }

        assert_eq!(queue.len(), 400);
        let mut last_seen = std::collections::HashMap::new();
        while let Some(envelope) = queue.try_take() {
            let descriptor = envelope.descriptor();
            let id: i64 = descriptor.id.as_ref().unwrap().parse().unwrap();
            let previous = last_seen.insert(descriptor.entity_type.clone(), id);
            assert!(previous.map_or(true, |p| p < id));
        }
    }
}
