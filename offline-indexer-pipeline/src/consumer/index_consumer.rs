//! Index consumer.
//!
//! Receives envelopes from the broker channel and, when an indexer is
//! attached, applies them. Indexing failures are logged per message and
//! never stop the run; broker failures do.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use offline_indexer_broker::{
    AckMode, Broker, BrokerMessage, BrokerSession, MessageConsumer, DEFAULT_CHANNEL,
};
use offline_indexer_shared::SubmissionEnvelope;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::fault::FaultSignal;
use crate::errors::PipelineError;
use crate::indexer::IndexerService;
use crate::resources::BrokerResources;
use crate::role::{AtomicRoleState, RoleState};

/// Placeholder identity that is treated as no identity at all.
const NULL_CLIENT_ID: &str = "null";

/// Configuration for an [`IndexConsumer`].
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Name used in logs.
    pub name: String,
    pub channel: String,
    pub transacted: bool,
    pub ack_mode: AckMode,
    /// Register `client_id` as a durable identity.
    pub durable: bool,
    pub client_id: Option<String>,
    /// Stop after this many receives. `None` runs until shut down.
    pub stop_after: Option<u64>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            name: "consumer".to_string(),
            channel: DEFAULT_CHANNEL.to_string(),
            transacted: false,
            ack_mode: AckMode::Auto,
            durable: false,
            client_id: None,
            stop_after: None,
        }
    }
}

impl ConsumerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_transacted(mut self, transacted: bool) -> Self {
        self.transacted = transacted;
        self
    }

    pub fn with_ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = ack_mode;
        self
    }

    /// Use `client_id` as a durable identity.
    pub fn with_durable_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.durable = true;
        self.client_id = Some(client_id.into());
        self
    }

    /// Bound the run to `count` receives; zero leaves it unbounded.
    pub fn with_stop_after(mut self, count: u64) -> Self {
        self.stop_after = (count > 0).then_some(count);
        self
    }

    /// The identity to register, if durability was requested with a usable
    /// identity.
    pub fn effective_client_id(&self) -> Option<&str> {
        if !self.durable {
            return None;
        }
        self.client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != NULL_CLIENT_ID)
    }

    pub fn is_transacted(&self) -> bool {
        self.transacted || self.ack_mode == AckMode::SessionTransacted
    }
}

/// Receives envelopes from the broker channel.
///
/// Without an indexer the consumer only counts deliveries, which checks the
/// channel independently of indexing.
pub struct IndexConsumer {
    broker: Arc<dyn Broker>,
    config: ConsumerConfig,
    indexer: Option<Arc<dyn IndexerService>>,
    received_count: AtomicU64,
    indexing_failures: AtomicU64,
    state: AtomicRoleState,
    shutdown: CancellationToken,
    fault: Arc<FaultSignal>,
}

impl IndexConsumer {
    /// Create a drain-only consumer with the default configuration.
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self::with_config(broker, ConsumerConfig::default())
    }

    pub fn with_config(broker: Arc<dyn Broker>, config: ConsumerConfig) -> Self {
        Self {
            broker,
            config,
            indexer: None,
            received_count: AtomicU64::new(0),
            indexing_failures: AtomicU64::new(0),
            state: AtomicRoleState::new(),
            shutdown: CancellationToken::new(),
            fault: Arc::new(FaultSignal::default()),
        }
    }

    /// Apply received envelopes to `indexer`.
    pub fn with_indexer(mut self, indexer: Arc<dyn IndexerService>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn indexing_enabled(&self) -> bool {
        self.indexer.is_some()
    }

    pub fn received_count(&self) -> u64 {
        self.received_count.load(Ordering::SeqCst)
    }

    /// Messages whose decoding or indexing failed. They are included in
    /// `received_count`.
    pub fn indexing_failures(&self) -> u64 {
        self.indexing_failures.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> RoleState {
        self.state.load()
    }

    /// False before `run`, after it ends, and as soon as a connection fault
    /// is reported.
    pub fn is_running(&self) -> bool {
        self.state() == RoleState::Running && !self.fault.is_faulted()
    }

    /// Ask the run loop to stop. Safe to call any number of times, before,
    /// during or after `run`.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!(consumer = %self.config.name, "Consumer shutdown requested");
        }
        self.shutdown.cancel();
    }

    /// Open the connection, register the fault observer and durable
    /// identity, then open the session and consumer for the channel.
    pub(crate) async fn startup(&self) -> Result<BrokerResources, PipelineError> {
        let mut resources = BrokerResources::default();
        resources.connection = Some(self.broker.connect().await?);

        let connection = resources.connection()?;
        if let Some(client_id) = self.config.effective_client_id() {
            connection.set_client_id(client_id)?;
        }
        connection.set_fault_listener(self.fault.clone());

        let session = connection
            .create_session(self.config.is_transacted(), self.config.ack_mode)
            .await?;
        resources.session = Some(session);
        let consumer = resources
            .session()?
            .create_consumer(&self.config.channel)
            .await?;
        resources.consumer = Some(consumer);

        info!(
            channel = %self.config.channel,
            ack_mode = %self.config.ack_mode,
            transacted = self.config.is_transacted(),
            client_id = ?self.config.effective_client_id(),
            indexing = self.indexing_enabled(),
            "Consumer started"
        );
        Ok(resources)
    }

    /// Receive until the bound is reached, the channel closes, shutdown is
    /// requested or the connection faults.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The run ended normally
    /// * `Err(PipelineError::Fault)` - If the broker reported a connection fault
    /// * `Err(PipelineError::InvalidState)` - If the consumer already ran
    /// * `Err(PipelineError)` - If startup, a receive or a commit failed
    #[instrument(skip(self), fields(consumer = %self.config.name, channel = %self.config.channel))]
    pub async fn run(&self) -> Result<(), PipelineError> {
        self.state.begin("consumer")?;

        let result = self.run_to_completion().await;
        match &result {
            Ok(()) => info!(
                received_count = self.received_count(),
                indexing_failures = self.indexing_failures(),
                "Consumer stopped"
            ),
            Err(e) => error!(
                error = %e,
                received_count = self.received_count(),
                "Consumer failed"
            ),
        }

        self.state.finish(&result);
        result
    }

    async fn run_to_completion(&self) -> Result<(), PipelineError> {
        let mut resources = self.startup().await?;
        let result = self.receive_loop(&mut resources).await;
        resources.release();
        result
    }

    async fn receive_loop(&self, resources: &mut BrokerResources) -> Result<(), PipelineError> {
        let (consumer, session) = resources.consumer_link()?;

        loop {
            if self.bound_reached() {
                info!(stop_after = ?self.config.stop_after, "Receive bound reached");
                return Ok(());
            }

            let message = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = self.fault.faulted() => {
                    return Err(PipelineError::fault(self.fault.reason()));
                }
                received = consumer.receive() => match received? {
                    Some(message) => message,
                    None => {
                        info!("Channel closed");
                        return Ok(());
                    }
                },
            };

            self.handle(&**consumer, session, message).await?;
        }
    }

    fn bound_reached(&self) -> bool {
        self.config
            .stop_after
            .is_some_and(|bound| self.received_count() >= bound)
    }

    async fn handle(
        &self,
        consumer: &dyn MessageConsumer,
        session: &dyn BrokerSession,
        message: BrokerMessage,
    ) -> Result<(), PipelineError> {
        if let Some(indexer) = &self.indexer {
            self.index(indexer, &message).await;
        }

        let received_count = self.received_count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(received_count, action = ?message.header("action"), "Received message");

        if session.is_transacted() {
            session.commit().await?;
        } else if session.ack_mode().requires_explicit_ack() {
            consumer.acknowledge(&message).await?;
        }
        Ok(())
    }

    async fn index(&self, indexer: &Arc<dyn IndexerService>, message: &BrokerMessage) {
        let envelope = match SubmissionEnvelope::decode(&message.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.indexing_failures.fetch_add(1, Ordering::SeqCst);
                error!(error = %e, "Failed to decode envelope");
                return;
            }
        };

        let (action, descriptor) = envelope.into_parts();
        if let Err(e) = indexer.apply(action, &descriptor).await {
            self.indexing_failures.fetch_add(1, Ordering::SeqCst);
            error!(
                error = %e,
                action = %action,
                entity_type = %descriptor.entity_type,
                id = ?descriptor.id,
                "Failed to index object"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_requires_durable_and_real_identity() {
        let config = ConsumerConfig {
            client_id: Some("jerry".to_string()),
            ..Default::default()
        };
        assert_eq!(config.effective_client_id(), None);

        let config = ConsumerConfig::default().with_durable_client_id("jerry");
        assert_eq!(config.effective_client_id(), Some("jerry"));

        let config = ConsumerConfig::default().with_durable_client_id("null");
        assert_eq!(config.effective_client_id(), None);

        let config = ConsumerConfig::default().with_durable_client_id("  ");
        assert_eq!(config.effective_client_id(), None);
    }

    #[test]
    fn test_session_transacted_ack_mode_implies_transaction() {
        assert!(!ConsumerConfig::default().is_transacted());
        assert!(ConsumerConfig::default().with_transacted(true).is_transacted());
        assert!(ConsumerConfig::default()
            .with_ack_mode(AckMode::SessionTransacted)
            .is_transacted());
    }
}
