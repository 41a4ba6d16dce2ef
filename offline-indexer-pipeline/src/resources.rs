//! Scoped ownership of a role's broker resources.

use offline_indexer_broker::{BrokerConnection, BrokerSession, MessageConsumer, MessageProducer};
use tracing::{debug, warn};

use crate::errors::PipelineError;

/// The connection, session and producer or consumer a role opened.
///
/// Released in reverse order of acquisition when `release` is called or the
/// value is dropped, whichever comes first. A failure closing one resource
/// does not stop the others from being closed.
#[derive(Default)]
pub(crate) struct BrokerResources {
    pub connection: Option<Box<dyn BrokerConnection>>,
    pub session: Option<Box<dyn BrokerSession>>,
    pub producer: Option<Box<dyn MessageProducer>>,
    pub consumer: Option<Box<dyn MessageConsumer>>,
}

impl BrokerResources {
    pub fn connection(&mut self) -> Result<&mut Box<dyn BrokerConnection>, PipelineError> {
        self.connection
            .as_mut()
            .ok_or_else(|| PipelineError::invalid_state("no broker connection"))
    }

    pub fn session(&self) -> Result<&dyn BrokerSession, PipelineError> {
        self.session
            .as_deref()
            .ok_or_else(|| PipelineError::invalid_state("no broker session"))
    }

    /// The producer together with the session that owns it.
    pub fn producer_link(&self) -> Result<(&dyn MessageProducer, &dyn BrokerSession), PipelineError> {
        match (self.producer.as_deref(), self.session.as_deref()) {
            (Some(producer), Some(session)) => Ok((producer, session)),
            _ => Err(PipelineError::invalid_state("producer is not started")),
        }
    }

    /// The consumer together with the session that owns it.
    pub fn consumer_link(
        &mut self,
    ) -> Result<(&mut Box<dyn MessageConsumer>, &dyn BrokerSession), PipelineError> {
        match (self.consumer.as_mut(), self.session.as_deref()) {
            (Some(consumer), Some(session)) => Ok((consumer, session)),
            _ => Err(PipelineError::invalid_state("consumer is not started")),
        }
    }

    pub fn release(&mut self) {
        if let Some(mut producer) = self.producer.take() {
            if let Err(e) = producer.close() {
                warn!(error = %e, "Failed to close producer");
            }
        }
        if let Some(mut consumer) = self.consumer.take() {
            if let Err(e) = consumer.close() {
                warn!(error = %e, "Failed to close consumer");
            }
        }
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close() {
                warn!(error = %e, "Failed to close session");
            }
        }
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close() {
                warn!(error = %e, "Failed to close connection");
            }
            debug!("Broker resources released");
        }
    }
}

impl Drop for BrokerResources {
    fn drop(&mut self) {
        self.release();
    }
}
