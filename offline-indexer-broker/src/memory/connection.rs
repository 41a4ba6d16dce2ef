//! Connections, sessions, producers and consumers of the in-memory broker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::channel::{MemoryChannel, StoredMessage};
use super::BrokerState;
use crate::sync::lock;
use crate::errors::BrokerError;
use crate::interfaces::{
    BrokerConnection, BrokerSession, FaultListener, MessageConsumer, MessageProducer,
};
use crate::types::{AckMode, BrokerMessage, DeliveryOptions};

pub(crate) struct ConnectionShared {
    pub id: Uuid,
    client_id: Mutex<Option<String>>,
    listener: Mutex<Option<Arc<dyn FaultListener>>>,
    closed: AtomicBool,
    faulted: AtomicBool,
}

impl ConnectionShared {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: Mutex::new(None),
            listener: Mutex::new(None),
            closed: AtomicBool::new(false),
            faulted: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the connection faulted and notify its listener.
    pub fn fault(&self, reason: &str) {
        self.faulted.store(true, Ordering::SeqCst);

        let listener = lock(&self.listener).clone();
        if let Some(listener) = listener {
            listener.on_fault(&BrokerError::fault(reason));
        }
    }

    fn ensure_usable(&self) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::closed("connection"));
        }
        if self.faulted.load(Ordering::SeqCst) {
            return Err(BrokerError::fault(format!("connection {} has faulted", self.id)));
        }
        Ok(())
    }
}

/// A connection to a [`super::MemoryBroker`].
pub struct MemoryConnection {
    state: Arc<BrokerState>,
    shared: Arc<ConnectionShared>,
}

impl MemoryConnection {
    pub(crate) fn open(state: Arc<BrokerState>) -> Self {
        let shared = Arc::new(ConnectionShared::new());
        state.register_connection(&shared);
        Self { state, shared }
    }
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    fn set_client_id(&mut self, client_id: &str) -> Result<(), BrokerError> {
        self.shared.ensure_usable()?;

        let mut current = lock(&self.shared.client_id);
        if let Some(existing) = current.as_ref() {
            return Err(BrokerError::InvalidClientId(format!(
                "client id already set to '{}'",
                existing
            )));
        }

        if !lock(&self.state.client_ids).insert(client_id.to_string()) {
            return Err(BrokerError::InvalidClientId(format!(
                "client id '{}' is in use by another connection",
                client_id
            )));
        }

        *current = Some(client_id.to_string());
        debug!(connection = %self.shared.id, client_id = %client_id, "Client id set");
        Ok(())
    }

    fn set_fault_listener(&mut self, listener: Arc<dyn FaultListener>) {
        *lock(&self.shared.listener) = Some(listener);
    }

    async fn create_session(
        &self,
        transacted: bool,
        ack_mode: AckMode,
    ) -> Result<Box<dyn BrokerSession>, BrokerError> {
        self.shared.ensure_usable()?;

        self.state.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            shared: Arc::new(SessionShared {
                state: self.state.clone(),
                connection: self.shared.clone(),
                transacted: transacted || ack_mode == AckMode::SessionTransacted,
                ack_mode,
                staged: Mutex::new(Vec::new()),
                pending: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }))
    }

    fn close(&mut self) -> Result<(), BrokerError> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(client_id) = lock(&self.shared.client_id).take() {
            lock(&self.state.client_ids).remove(&client_id);
        }
        self.state.open_connections.fetch_sub(1, Ordering::SeqCst);

        debug!(connection = %self.shared.id, "Connection closed");
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

type ChannelMessages = Vec<(Arc<MemoryChannel>, StoredMessage)>;

struct SessionShared {
    state: Arc<BrokerState>,
    connection: Arc<ConnectionShared>,
    transacted: bool,
    ack_mode: AckMode,
    /// Sends waiting for commit.
    staged: Mutex<ChannelMessages>,
    /// Received messages waiting for acknowledgement or commit.
    pending: Mutex<ChannelMessages>,
    closed: AtomicBool,
}

impl SessionShared {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::closed("session"));
        }
        self.connection.ensure_usable()
    }

    fn tracks_delivery(&self) -> bool {
        self.transacted || self.ack_mode.requires_explicit_ack()
    }

    /// Return unsettled received messages to the head of their channels.
    fn recover(&self) {
        let pending = std::mem::take(&mut *lock(&self.pending));
        if pending.is_empty() {
            return;
        }

        let mut groups: Vec<(Arc<MemoryChannel>, Vec<StoredMessage>)> = Vec::new();
        for (channel, message) in pending {
            match groups.iter_mut().find(|(c, _)| Arc::ptr_eq(c, &channel)) {
                Some((_, messages)) => messages.push(message),
                None => groups.push((channel, vec![message])),
            }
        }

        for (channel, messages) in groups {
            warn!(
                channel = %channel.name(),
                count = messages.len(),
                "Redelivering unacknowledged messages"
            );
            channel.requeue_front(messages);
        }
    }
}

/// A session on a [`MemoryConnection`].
pub struct MemorySession {
    shared: Arc<SessionShared>,
}

#[async_trait]
impl BrokerSession for MemorySession {
    fn is_transacted(&self) -> bool {
        self.shared.transacted
    }

    fn ack_mode(&self) -> AckMode {
        self.shared.ack_mode
    }

    async fn create_producer(
        &self,
        channel: &str,
    ) -> Result<Box<dyn MessageProducer>, BrokerError> {
        self.shared.ensure_open()?;

        self.shared.state.open_clients.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryProducer {
            session: self.shared.clone(),
            channel: self.shared.state.channel(channel),
            closed: false,
        }))
    }

    async fn create_consumer(
        &self,
        channel: &str,
    ) -> Result<Box<dyn MessageConsumer>, BrokerError> {
        self.shared.ensure_open()?;

        self.shared.state.open_clients.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConsumer {
            session: self.shared.clone(),
            channel: self.shared.state.channel(channel),
            closed: false,
        }))
    }

    async fn commit(&self) -> Result<(), BrokerError> {
        if !self.shared.transacted {
            return Err(BrokerError::session("session is not transacted"));
        }
        self.shared.ensure_open()?;

        let staged = std::mem::take(&mut *lock(&self.shared.staged));
        for (channel, message) in staged {
            channel.publish(message);
        }
        lock(&self.shared.pending).clear();

        Ok(())
    }

    fn close(&mut self) -> Result<(), BrokerError> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let discarded = std::mem::take(&mut *lock(&self.shared.staged));
        if !discarded.is_empty() {
            warn!(count = discarded.len(), "Rolling back uncommitted sends");
        }
        self.shared.recover();
        self.shared.state.open_sessions.fetch_sub(1, Ordering::SeqCst);

        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Sends to one in-memory channel.
pub struct MemoryProducer {
    session: Arc<SessionShared>,
    channel: Arc<MemoryChannel>,
    closed: bool,
}

#[async_trait]
impl MessageProducer for MemoryProducer {
    async fn send(
        &self,
        mut message: BrokerMessage,
        options: &DeliveryOptions,
    ) -> Result<(), BrokerError> {
        if self.closed {
            return Err(BrokerError::closed("producer"));
        }
        self.session.ensure_open()?;

        if self.session.state.take_send_failure() {
            return Err(BrokerError::send(format!(
                "injected send failure on {}",
                self.channel.name()
            )));
        }

        message.set_receipt(self.channel.next_receipt());
        message.sent_at = Some(Utc::now());
        message
            .headers
            .insert("delivery-mode".to_string(), options.mode.as_str().to_string());

        let stored = StoredMessage {
            message,
            expires_at: options.time_to_live.map(|ttl| Instant::now() + ttl),
        };

        if self.session.transacted {
            lock(&self.session.staged).push((self.channel.clone(), stored));
        } else {
            self.channel.publish(stored);
        }

        Ok(())
    }

    fn close(&mut self) -> Result<(), BrokerError> {
        if !self.closed {
            self.closed = true;
            self.session.state.open_clients.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for MemoryProducer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Receives from one in-memory channel.
pub struct MemoryConsumer {
    session: Arc<SessionShared>,
    channel: Arc<MemoryChannel>,
    closed: bool,
}

#[async_trait]
impl MessageConsumer for MemoryConsumer {
    async fn receive(&mut self) -> Result<Option<BrokerMessage>, BrokerError> {
        if self.closed {
            return Err(BrokerError::closed("consumer"));
        }
        self.session.ensure_open()?;

        let Some(stored) = self.channel.next().await else {
            return Ok(None);
        };

        let message = stored.message.clone();
        if self.session.tracks_delivery() {
            lock(&self.session.pending).push((self.channel.clone(), stored));
        }

        Ok(Some(message))
    }

    async fn acknowledge(&self, message: &BrokerMessage) -> Result<(), BrokerError> {
        if !self.session.ack_mode.requires_explicit_ack() || self.session.transacted {
            return Ok(());
        }
        self.session.ensure_open()?;

        if message.receipt().is_none() {
            return Err(BrokerError::acknowledge("message was never delivered"));
        }

        lock(&self.session.pending).clear();
        Ok(())
    }

    fn close(&mut self) -> Result<(), BrokerError> {
        if !self.closed {
            self.closed = true;
            self.session.state.open_clients.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
