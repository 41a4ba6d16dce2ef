//! Index producer.
//!
//! Takes envelopes from the [`SendQueue`] in order and publishes one broker
//! message per envelope.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use offline_indexer_broker::{AckMode, Broker, BrokerMessage, DeliveryOptions, DEFAULT_CHANNEL};
use offline_indexer_shared::{SubmissionEnvelope, ENVELOPE_VERSION};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::errors::PipelineError;
use crate::queue::SendQueue;
use crate::resources::BrokerResources;
use crate::role::{AtomicRoleState, RoleState};

/// Characters of payload shown per message in verbose mode.
const VERBOSE_PREVIEW_CHARS: usize = 50;

/// Configuration for an [`IndexProducer`].
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Name used in logs.
    pub name: String,
    pub channel: String,
    /// Commit the session after every send.
    pub transacted: bool,
    pub persistent: bool,
    /// Zero means messages never expire.
    pub time_to_live: Duration,
    /// Stop after this many sends. `None` runs until shut down.
    pub stop_after: Option<u64>,
    /// Log a preview of every sent payload.
    pub verbose: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            name: "producer".to_string(),
            channel: DEFAULT_CHANNEL.to_string(),
            transacted: false,
            persistent: false,
            time_to_live: Duration::ZERO,
            stop_after: None,
            verbose: false,
        }
    }
}

impl ProducerConfig {
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

    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn with_time_to_live(mut self, time_to_live: Duration) -> Self {
        self.time_to_live = time_to_live;
        self
    }

    /// Bound the run to `count` sends; zero leaves it unbounded.
    pub fn with_stop_after(mut self, count: u64) -> Self {
        self.stop_after = (count > 0).then_some(count);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn delivery_options(&self) -> DeliveryOptions {
        DeliveryOptions::new(self.persistent, self.time_to_live)
    }
}

/// Moves envelopes from the send queue onto the broker channel.
///
/// A producer runs once. Its queue handle is shared with every
/// [`OfflineIndexer`](crate::OfflineIndexer) built from it, so submissions
/// made before `run` are sent once it starts.
pub struct IndexProducer {
    broker: Arc<dyn Broker>,
    config: ProducerConfig,
    queue: SendQueue,
    sent_count: AtomicU64,
    state: AtomicRoleState,
    shutdown: CancellationToken,
}

impl IndexProducer {
    /// Create a producer with the default configuration and a fresh queue.
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self::with_config(broker, ProducerConfig::default())
    }

    pub fn with_config(broker: Arc<dyn Broker>, config: ProducerConfig) -> Self {
        Self {
            broker,
            config,
            queue: SendQueue::new(),
            sent_count: AtomicU64::new(0),
            state: AtomicRoleState::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Drain `queue` instead of a fresh one.
    pub fn with_queue(mut self, queue: SendQueue) -> Self {
        self.queue = queue;
        self
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// Handle to the queue this producer drains.
    pub fn send_queue(&self) -> SendQueue {
        self.queue.clone()
    }

    pub fn sent_count(&self) -> u64 {
        self.sent_count.load(Ordering::SeqCst)
    }

    /// Envelopes still waiting in the queue.
    pub fn unsent_count(&self) -> usize {
        self.queue.len()
    }

    pub fn state(&self) -> RoleState {
        self.state.load()
    }

    /// Ask the run loop to stop before its next send. Safe to call any
    /// number of times, before, during or after `run`.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!(producer = %self.config.name, "Producer shutdown requested");
        }
        self.shutdown.cancel();
    }

    /// Open the connection, session and producer for the configured channel.
    ///
    /// Resources acquired before a failure are released when the partially
    /// filled value is dropped.
    pub(crate) async fn startup(&self) -> Result<BrokerResources, PipelineError> {
        let mut resources = BrokerResources::default();

        resources.connection = Some(self.broker.connect().await?);
        let session = resources
            .connection()?
            .create_session(self.config.transacted, AckMode::Auto)
            .await?;
        resources.session = Some(session);
        let producer = resources
            .session()?
            .create_producer(&self.config.channel)
            .await?;
        resources.producer = Some(producer);

        info!(
            channel = %self.config.channel,
            transacted = self.config.transacted,
            persistent = self.config.persistent,
            "Producer started"
        );
        Ok(resources)
    }

    /// Send queued envelopes until the bound is reached or shutdown is
    /// requested.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The run ended normally
    /// * `Err(PipelineError::InvalidState)` - If the producer already ran
    /// * `Err(PipelineError)` - If startup or a send failed; the run ends
    ///   and the envelope being sent is not re-queued
    #[instrument(skip(self), fields(producer = %self.config.name, channel = %self.config.channel))]
    pub async fn run(&self) -> Result<(), PipelineError> {
        self.state.begin("producer")?;

        let result = self.run_to_completion().await;
        match &result {
            Ok(()) => info!(sent_count = self.sent_count(), "Producer stopped"),
            Err(e) => error!(error = %e, sent_count = self.sent_count(), "Producer failed"),
        }

        self.state.finish(&result);
        result
    }

    async fn run_to_completion(&self) -> Result<(), PipelineError> {
        let mut resources = self.startup().await?;
        let result = self.drain(&resources).await;
        resources.release();
        result
    }

    async fn drain(&self, resources: &BrokerResources) -> Result<(), PipelineError> {
        let options = self.config.delivery_options();

        loop {
            if self.bound_reached() {
                info!(stop_after = ?self.config.stop_after, "Send bound reached");
                return Ok(());
            }

            let envelope = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(()),
                envelope = self.queue.take() => envelope,
            };

            self.send(resources, envelope, &options).await?;
        }
    }

    fn bound_reached(&self) -> bool {
        self.config
            .stop_after
            .is_some_and(|bound| self.sent_count() >= bound)
    }

    async fn send(
        &self,
        resources: &BrokerResources,
        envelope: SubmissionEnvelope,
        options: &DeliveryOptions,
    ) -> Result<(), PipelineError> {
        let (producer, session) = resources.producer_link()?;
        let payload = envelope.encode()?;

        if self.config.verbose {
            info!(
                producer = %self.config.name,
                payload = %preview(&payload),
                "Sending"
            );
        }

        let message = BrokerMessage::new(payload)
            .with_header("action", envelope.action().as_str())
            .with_header("envelope-version", ENVELOPE_VERSION.to_string());
        producer.send(message, options).await?;

        if session.is_transacted() {
            session.commit().await?;
        }

        let sent_count = self.sent_count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            envelope_id = %envelope.envelope_id(),
            action = %envelope.action(),
            sent_count,
            "Sent envelope"
        );
        Ok(())
    }
}

/// Leading characters of a payload, with `...` appended when cut.
fn preview(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    match text.char_indices().nth(VERBOSE_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offline_indexer_broker::{BrokerError, MemoryBroker};
    use offline_indexer_shared::{IndexAction, IndexDescriptor};

    fn envelope(id: u32) -> SubmissionEnvelope {
        SubmissionEnvelope::new(
            IndexAction::Create,
            IndexDescriptor::new("person").with_id(id.to_string()),
        )
    }

    #[test]
    fn test_preview_truncates_long_payloads() {
        let long = "x".repeat(80);
        assert_eq!(preview(long.as_bytes()), format!("{}...", "x".repeat(50)));
        assert_eq!(preview(b"short"), "short");
    }

    #[test]
    fn test_zero_stop_after_is_unbounded() {
        assert_eq!(ProducerConfig::default().with_stop_after(0).stop_after, None);
        assert_eq!(ProducerConfig::default().with_stop_after(3).stop_after, Some(3));
    }

    #[tokio::test]
    async fn test_bounded_run_sends_in_order_and_stops() {
        let broker = MemoryBroker::new();
        let producer = IndexProducer::with_config(
            Arc::new(broker.clone()),
            ProducerConfig::default().with_stop_after(2),
        );
        let queue = producer.send_queue();
        for id in 1..=3 {
            queue.enqueue(envelope(id));
        }

        producer.run().await.unwrap();

        assert_eq!(producer.sent_count(), 2);
        assert_eq!(producer.unsent_count(), 1);
        assert_eq!(producer.state(), RoleState::Stopped);
        assert_eq!(broker.queued(DEFAULT_CHANNEL), 2);
        assert_eq!(broker.stats().open_connections, 0);
    }

    #[tokio::test]
    async fn test_unreachable_broker_fails_startup() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        let producer = IndexProducer::new(Arc::new(broker));
        producer.send_queue().enqueue(envelope(1));

        let err = producer.run().await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Broker(BrokerError::ConnectionError(_))
        ));
        assert_eq!(producer.state(), RoleState::Failed);
        assert_eq!(producer.unsent_count(), 1);
    }

    #[tokio::test]
    async fn test_producer_runs_once() {
        let producer = IndexProducer::new(Arc::new(MemoryBroker::new()));
        producer.shutdown();
        producer.run().await.unwrap();

        assert!(matches!(
            producer.run().await,
            Err(PipelineError::InvalidState(_))
        ));
    }
}
