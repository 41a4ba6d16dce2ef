//! In-memory channels.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Instant;

use tokio::sync::Notify;
use tracing::debug;

use crate::sync::lock;
use crate::types::{BrokerMessage, Receipt};

/// A message waiting in a channel.
#[derive(Debug, Clone)]
pub(crate) struct StoredMessage {
    pub message: BrokerMessage,
    pub expires_at: Option<Instant>,
}

impl StoredMessage {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn offset(&self) -> i64 {
        self.message.receipt().map(|r| r.offset).unwrap_or_default()
    }
}

/// A FIFO channel. Receivers wait on `notify` when it is empty.
pub(crate) struct MemoryChannel {
    name: String,
    messages: std::sync::Mutex<VecDeque<StoredMessage>>,
    next_offset: AtomicI64,
    closed: AtomicBool,
    notify: Notify,
}

impl MemoryChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            messages: std::sync::Mutex::new(VecDeque::new()),
            next_offset: AtomicI64::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn next_receipt(&self) -> Receipt {
        Receipt {
            channel: self.name.clone(),
            partition: 0,
            offset: self.next_offset.fetch_add(1, Ordering::SeqCst),
        }
    }

    pub fn publish(&self, message: StoredMessage) {
        lock(&self.messages).push_back(message);
        self.notify.notify_one();
    }

    pub fn publish_all(&self, messages: Vec<StoredMessage>) {
        if messages.is_empty() {
            return;
        }
        lock(&self.messages).extend(messages);
        self.notify.notify_one();
    }

    /// Put messages back at the head of the channel, keeping their order.
    pub fn requeue_front(&self, mut messages: Vec<StoredMessage>) {
        if messages.is_empty() {
            return;
        }
        messages.sort_by_key(StoredMessage::offset);

        let mut queue = lock(&self.messages);
        for message in messages.into_iter().rev() {
            queue.push_front(message);
        }
        drop(queue);

        self.notify.notify_one();
    }

    fn poll(&self) -> Option<StoredMessage> {
        let now = Instant::now();
        let mut queue = lock(&self.messages);

        while let Some(message) = queue.pop_front() {
            if message.is_expired(now) {
                debug!(channel = %self.name, offset = message.offset(), "Dropping expired message");
                continue;
            }
            return Some(message);
        }

        None
    }

    /// Wait for the next live message. Returns `None` once the channel is
    /// closed and drained.
    pub async fn next(&self) -> Option<StoredMessage> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.poll() {
                // Pass any stored wakeup on to the next receiver.
                if !self.is_empty() {
                    self.notify.notify_one();
                }
                return Some(message);
            }

            if self.closed.load(Ordering::SeqCst) {
                return None;
            }

            notified.await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        lock(&self.messages).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
