//! In-process broker.
//!
//! `MemoryBroker` keeps every channel in memory and loses everything when
//! dropped, like an embedded non-persistent broker. It implements the full
//! session semantics the offline indexer relies on: transacted sends are
//! staged until commit, and messages received under client acknowledgement
//! or a transaction are redelivered if their session closes unsettled.
//!
//! It also exposes hooks to simulate outages, send failures and
//! connection faults.

mod channel;
mod connection;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::errors::BrokerError;
use crate::interfaces::{Broker, BrokerConnection};
use crate::sync::lock;

use channel::MemoryChannel;
use connection::ConnectionShared;
pub use connection::{MemoryConnection, MemoryConsumer, MemoryProducer, MemorySession};

/// Counts of broker resources that have been opened and not yet closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryBrokerStats {
    pub open_connections: usize,
    pub open_sessions: usize,
    /// Open producers and consumers.
    pub open_clients: usize,
}

pub(crate) struct BrokerState {
    available: AtomicBool,
    channels: Mutex<HashMap<String, Arc<MemoryChannel>>>,
    connections: Mutex<Vec<Weak<ConnectionShared>>>,
    pub(crate) client_ids: Mutex<HashSet<String>>,
    failing_sends: AtomicUsize,
    pub(crate) open_connections: AtomicUsize,
    pub(crate) open_sessions: AtomicUsize,
    pub(crate) open_clients: AtomicUsize,
}

impl BrokerState {
    fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            channels: Mutex::new(HashMap::new()),
            connections: Mutex::new(Vec::new()),
            client_ids: Mutex::new(HashSet::new()),
            failing_sends: AtomicUsize::new(0),
            open_connections: AtomicUsize::new(0),
            open_sessions: AtomicUsize::new(0),
            open_clients: AtomicUsize::new(0),
        }
    }

    /// Get a channel, creating it on first use.
    pub(crate) fn channel(&self, name: &str) -> Arc<MemoryChannel> {
        lock(&self.channels)
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryChannel::new(name)))
            .clone()
    }

    pub(crate) fn register_connection(&self, connection: &Arc<ConnectionShared>) {
        let mut connections = lock(&self.connections);
        connections.retain(|c| c.strong_count() > 0);
        connections.push(Arc::downgrade(connection));
        self.open_connections.fetch_add(1, Ordering::SeqCst);
    }

    /// Consume one pending injected send failure, if any.
    pub(crate) fn take_send_failure(&self) -> bool {
        self.failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// An in-process message broker.
///
/// Cloning yields another handle to the same broker.
///
/// # Example
///
/// ```ignore
/// let broker = MemoryBroker::new();
/// let connection = broker.connect().await?;
/// let session = connection.create_session(false, AckMode::Auto).await?;
/// let producer = session.create_producer(DEFAULT_CHANNEL).await?;
/// producer.send(BrokerMessage::new(b"payload".to_vec()), &DeliveryOptions::default()).await?;
/// ```
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(BrokerState::new()),
        }
    }

    /// Make new connections succeed or fail. Existing connections are
    /// unaffected.
    pub fn set_available(&self, available: bool) {
        self.state.available.store(available, Ordering::SeqCst);
    }

    /// Make the next `count` sends fail with `BrokerError::SendError`.
    pub fn fail_next_sends(&self, count: usize) {
        self.state.failing_sends.store(count, Ordering::SeqCst);
    }

    /// Raise an asynchronous fault on every open connection.
    pub fn inject_fault(&self, reason: &str) {
        let connections: Vec<Arc<ConnectionShared>> = lock(&self.state.connections)
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|c| !c.is_closed())
            .collect();

        warn!(reason = %reason, connections = connections.len(), "Injecting connection fault");
        for connection in connections {
            connection.fault(reason);
        }
    }

    /// Close a channel. Receivers drain what is queued and then see the end
    /// of the channel.
    pub fn close_channel(&self, channel: &str) {
        info!(channel = %channel, "Closing channel");
        self.state.channel(channel).close();
    }

    /// Number of messages queued on a channel and not yet received.
    pub fn queued(&self, channel: &str) -> usize {
        lock(&self.state.channels)
            .get(channel)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> MemoryBrokerStats {
        MemoryBrokerStats {
            open_connections: self.state.open_connections.load(Ordering::SeqCst),
            open_sessions: self.state.open_sessions.load(Ordering::SeqCst),
            open_clients: self.state.open_clients.load(Ordering::SeqCst),
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        if !self.state.available.load(Ordering::SeqCst) {
            return Err(BrokerError::connection("memory broker is unavailable"));
        }

        Ok(Box::new(MemoryConnection::open(self.state.clone())))
    }
}
