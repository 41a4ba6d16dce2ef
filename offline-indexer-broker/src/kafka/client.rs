//! Kafka connections, sessions, producers and consumers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::context::{FaultContext, FaultRelay};
use super::KafkaBrokerConfig;
use crate::errors::BrokerError;
use crate::interfaces::{
    BrokerConnection, BrokerSession, FaultListener, MessageConsumer, MessageProducer,
};
use crate::sync::lock;
use crate::types::{AckMode, BrokerMessage, DeliveryOptions, Receipt};

const EXPIRES_AT_HEADER: &str = "expires-at-ms";

type ContextConsumer = StreamConsumer<FaultContext>;
type ContextProducer = FutureProducer<FaultContext>;

/// A logical connection to a Kafka cluster.
pub struct KafkaConnection {
    config: KafkaBrokerConfig,
    client_id: Option<String>,
    relay: Arc<FaultRelay>,
    closed: bool,
}

impl KafkaConnection {
    pub(crate) fn new(config: KafkaBrokerConfig) -> Self {
        Self {
            config,
            client_id: None,
            relay: Arc::new(FaultRelay::default()),
            closed: false,
        }
    }
}

#[async_trait]
impl BrokerConnection for KafkaConnection {
    fn set_client_id(&mut self, client_id: &str) -> Result<(), BrokerError> {
        if let Some(existing) = &self.client_id {
            return Err(BrokerError::InvalidClientId(format!(
                "client id already set to '{}'",
                existing
            )));
        }
        self.client_id = Some(client_id.to_string());
        Ok(())
    }

    fn set_fault_listener(&mut self, listener: Arc<dyn FaultListener>) {
        self.relay.set(listener);
    }

    async fn create_session(
        &self,
        transacted: bool,
        ack_mode: AckMode,
    ) -> Result<Box<dyn BrokerSession>, BrokerError> {
        if self.closed {
            return Err(BrokerError::closed("connection"));
        }

        Ok(Box::new(KafkaSession {
            config: self.config.clone(),
            client_id: self.client_id.clone(),
            context: FaultContext::new(self.relay.clone()),
            transacted: transacted || ack_mode == AckMode::SessionTransacted,
            ack_mode,
            producer: Mutex::new(None),
            consumers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }))
    }

    fn close(&mut self) -> Result<(), BrokerError> {
        self.closed = true;
        Ok(())
    }
}

/// A session: at most one transactional producer plus any consumers.
pub struct KafkaSession {
    config: KafkaBrokerConfig,
    client_id: Option<String>,
    context: FaultContext,
    transacted: bool,
    ack_mode: AckMode,
    producer: Mutex<Option<ContextProducer>>,
    consumers: Mutex<Vec<Arc<ContextConsumer>>>,
    closed: AtomicBool,
}

impl KafkaSession {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::closed("session"));
        }
        Ok(())
    }

    fn group_id(&self) -> &str {
        self.client_id.as_deref().unwrap_or(&self.config.group_id)
    }

    async fn session_producer(&self) -> Result<ContextProducer, BrokerError> {
        if let Some(producer) = lock(&self.producer).clone() {
            return Ok(producer);
        }

        let mut config = self.config.client_config();
        config
            .set("compression.type", "zstd")
            .set(
                "message.timeout.ms",
                self.config.message_timeout.as_millis().to_string(),
            )
            .set("acks", "all");
        if self.transacted {
            config.set(
                "transactional.id",
                format!("{}-{}", self.group_id(), Uuid::new_v4()),
            );
        }

        let producer: ContextProducer = config
            .create_with_context(self.context.clone())
            .map_err(|e| BrokerError::session(e.to_string()))?;

        if self.transacted {
            let timeout = self.config.transaction_timeout;
            let initializing = producer.clone();
            tokio::task::spawn_blocking(move || {
                initializing.init_transactions(timeout)?;
                initializing.begin_transaction()
            })
            .await
            .map_err(|e| BrokerError::session(e.to_string()))?
            .map_err(|e| BrokerError::session(format!("Failed to start transaction: {}", e)))?;
        }

        *lock(&self.producer) = Some(producer.clone());
        Ok(producer)
    }
}

#[async_trait]
impl BrokerSession for KafkaSession {
    fn is_transacted(&self) -> bool {
        self.transacted
    }

    fn ack_mode(&self) -> AckMode {
        self.ack_mode
    }

    async fn create_producer(
        &self,
        channel: &str,
    ) -> Result<Box<dyn MessageProducer>, BrokerError> {
        self.ensure_open()?;
        let producer = self.session_producer().await?;

        info!(topic = %channel, transacted = self.transacted, "Created Kafka producer");
        Ok(Box::new(KafkaProducer {
            producer,
            topic: channel.to_string(),
            timeout: self.config.message_timeout,
            transacted: self.transacted,
            closed: false,
        }))
    }

    async fn create_consumer(
        &self,
        channel: &str,
    ) -> Result<Box<dyn MessageConsumer>, BrokerError> {
        self.ensure_open()?;

        let auto_commit = !self.transacted && !self.ack_mode.requires_explicit_ack();
        let commit_interval = if self.ack_mode == AckMode::DupsOk {
            "5000"
        } else {
            "100"
        };

        let mut config = self.config.client_config();
        config
            .set("group.id", self.group_id())
            .set("enable.auto.commit", auto_commit.to_string())
            .set("auto.commit.interval.ms", commit_interval)
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000");

        let consumer: ContextConsumer = config
            .create_with_context(self.context.clone())
            .map_err(|e| BrokerError::session(e.to_string()))?;
        consumer
            .subscribe(&[channel])
            .map_err(|e| BrokerError::session(e.to_string()))?;

        let consumer = Arc::new(consumer);
        lock(&self.consumers).push(consumer.clone());

        info!(topic = %channel, group_id = %self.group_id(), auto_commit, "Created Kafka consumer");
        Ok(Box::new(KafkaConsumer {
            consumer,
            manual_ack: self.ack_mode.requires_explicit_ack() && !self.transacted,
            closed: false,
        }))
    }

    async fn commit(&self) -> Result<(), BrokerError> {
        if !self.transacted {
            return Err(BrokerError::session("session is not transacted"));
        }
        self.ensure_open()?;

        let producer = lock(&self.producer).clone();
        if let Some(producer) = producer {
            let timeout = self.config.transaction_timeout;
            tokio::task::spawn_blocking(move || {
                producer.commit_transaction(timeout)?;
                producer.begin_transaction()
            })
            .await
            .map_err(|e| BrokerError::commit(e.to_string()))?
            .map_err(|e| BrokerError::commit(e.to_string()))?;
        }

        let consumers = lock(&self.consumers).clone();
        for consumer in consumers {
            match consumer.commit_consumer_state(CommitMode::Sync) {
                Ok(()) => {}
                Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {
                    debug!("Nothing to commit");
                }
                Err(e) => return Err(BrokerError::commit(e.to_string())),
            }
        }

        Ok(())
    }

    fn close(&mut self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let producer = lock(&self.producer).take();
        if let (Some(producer), true) = (producer, self.transacted) {
            if let Err(e) = producer.abort_transaction(self.config.transaction_timeout) {
                warn!(error = %e, "Failed to abort open transaction");
            }
        }
        lock(&self.consumers).clear();

        Ok(())
    }
}

/// Sends to one topic.
pub struct KafkaProducer {
    producer: ContextProducer,
    topic: String,
    timeout: Duration,
    transacted: bool,
    closed: bool,
}

#[async_trait]
impl MessageProducer for KafkaProducer {
    async fn send(
        &self,
        message: BrokerMessage,
        options: &DeliveryOptions,
    ) -> Result<(), BrokerError> {
        if self.closed {
            return Err(BrokerError::closed("producer"));
        }

        let expires_at = options
            .time_to_live
            .map(|ttl| (Utc::now().timestamp_millis() + ttl.as_millis() as i64).to_string());

        let mut headers = OwnedHeaders::new().insert(Header {
            key: "delivery-mode",
            value: Some(options.mode.as_str()),
        });
        if let Some(expires_at) = &expires_at {
            headers = headers.insert(Header {
                key: EXPIRES_AT_HEADER,
                value: Some(expires_at.as_str()),
            });
        }
        for (key, value) in &message.headers {
            headers = headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_str()),
            });
        }

        let record = FutureRecord::<(), _>::to(&self.topic)
            .payload(&message.payload)
            .headers(headers);

        let delivery = self
            .producer
            .send(record, self.timeout)
            .await
            .map_err(|(e, _)| BrokerError::send(e.to_string()))?;

        debug!(topic = %self.topic, delivery = ?delivery, "Message delivered");
        Ok(())
    }

    fn close(&mut self) -> Result<(), BrokerError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Transactional output is settled by the session.
        if !self.transacted {
            self.producer
                .flush(self.timeout)
                .map_err(|e| BrokerError::send(format!("Failed to flush producer: {}", e)))?;
        }
        Ok(())
    }
}

/// Receives from one topic.
pub struct KafkaConsumer {
    consumer: Arc<ContextConsumer>,
    manual_ack: bool,
    closed: bool,
}

fn to_broker_message(msg: &BorrowedMessage<'_>) -> BrokerMessage {
    let mut headers = BTreeMap::new();
    if let Some(borrowed) = msg.headers() {
        for header in borrowed.iter() {
            if let Some(value) = header.value {
                headers.insert(
                    header.key.to_string(),
                    String::from_utf8_lossy(value).into_owned(),
                );
            }
        }
    }

    let mut message = BrokerMessage::new(msg.payload().unwrap_or_default().to_vec());
    message.headers = headers;
    message.sent_at = msg
        .timestamp()
        .to_millis()
        .and_then(DateTime::<Utc>::from_timestamp_millis);
    message.set_receipt(Receipt {
        channel: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
    });
    message
}

fn is_expired(message: &BrokerMessage, now_ms: i64) -> bool {
    message
        .header(EXPIRES_AT_HEADER)
        .and_then(|at| at.parse::<i64>().ok())
        .is_some_and(|at| at <= now_ms)
}

#[async_trait]
impl MessageConsumer for KafkaConsumer {
    async fn receive(&mut self) -> Result<Option<BrokerMessage>, BrokerError> {
        if self.closed {
            return Err(BrokerError::closed("consumer"));
        }

        loop {
            let message = {
                let borrowed = self
                    .consumer
                    .recv()
                    .await
                    .map_err(|e| BrokerError::receive(e.to_string()))?;
                to_broker_message(&borrowed)
            };

            if is_expired(&message, Utc::now().timestamp_millis()) {
                debug!(receipt = ?message.receipt(), "Dropping expired message");
                continue;
            }

            return Ok(Some(message));
        }
    }

    async fn acknowledge(&self, message: &BrokerMessage) -> Result<(), BrokerError> {
        if !self.manual_ack {
            return Ok(());
        }

        let receipt = message
            .receipt()
            .ok_or_else(|| BrokerError::acknowledge("message was never delivered"))?;

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &receipt.channel,
            receipt.partition,
            Offset::Offset(receipt.offset + 1),
        )
        .map_err(|e| BrokerError::acknowledge(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| BrokerError::acknowledge(e.to_string()))
    }

    fn close(&mut self) -> Result<(), BrokerError> {
        if !self.closed {
            self.closed = true;
            self.consumer.unsubscribe();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_header_is_enforced() {
        let message = BrokerMessage::new(Vec::new()).with_header(EXPIRES_AT_HEADER, "1000");
        assert!(is_expired(&message, 1000));
        assert!(!is_expired(&message, 999));
        assert!(!is_expired(&BrokerMessage::new(Vec::new()), i64::MAX));
    }
}
