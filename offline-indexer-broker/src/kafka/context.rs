//! rdkafka client context that relays client errors to a fault listener.

use std::sync::{Arc, Mutex};

use rdkafka::client::ClientContext;
use rdkafka::consumer::ConsumerContext;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use tracing::{error, warn};

use crate::errors::BrokerError;
use crate::interfaces::FaultListener;
use crate::sync::lock;

/// Holds the fault listener registered on a connection.
#[derive(Default)]
pub(crate) struct FaultRelay {
    listener: Mutex<Option<Arc<dyn FaultListener>>>,
}

impl FaultRelay {
    pub fn set(&self, listener: Arc<dyn FaultListener>) {
        *lock(&self.listener) = Some(listener);
    }

    fn notify(&self, error: &BrokerError) {
        let listener = lock(&self.listener).clone();
        if let Some(listener) = listener {
            listener.on_fault(error);
        }
    }
}

/// Context shared by every client a connection creates.
#[derive(Clone)]
pub(crate) struct FaultContext {
    relay: Arc<FaultRelay>,
}

impl FaultContext {
    pub fn new(relay: Arc<FaultRelay>) -> Self {
        Self { relay }
    }
}

impl ClientContext for FaultContext {
    fn error(&self, error: KafkaError, reason: &str) {
        match error.rdkafka_error_code() {
            Some(RDKafkaErrorCode::AllBrokersDown) | Some(RDKafkaErrorCode::Fatal) => {
                error!(error = %error, reason = %reason, "Kafka connection fault");
                self.relay
                    .notify(&BrokerError::fault(format!("{}: {}", error, reason)));
            }
            _ => warn!(error = %error, reason = %reason, "Kafka client error"),
        }
    }
}

impl ConsumerContext for FaultContext {}
