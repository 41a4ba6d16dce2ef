use std::sync::OnceLock;

use offline_indexer_broker::{BrokerError, FaultListener};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Records the first connection fault and wakes the run loop.
#[derive(Default)]
pub(crate) struct FaultSignal {
    token: CancellationToken,
    reason: OnceLock<String>,
}

impl FaultSignal {
    pub fn is_faulted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn faulted(&self) {
        self.token.cancelled().await
    }

    pub fn reason(&self) -> String {
        self.reason
            .get()
            .cloned()
            .unwrap_or_else(|| "connection fault".to_string())
    }
}

impl FaultListener for FaultSignal {
    fn on_fault(&self, error: &BrokerError) {
        let first = self.reason.set(error.to_string()).is_ok();
        if first {
            warn!(error = %error, "Broker connection fault; consumer stopping");
        }
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_fault_wins() {
        let signal = FaultSignal::default();
        assert!(!signal.is_faulted());

        signal.on_fault(&BrokerError::fault("link lost"));
        signal.on_fault(&BrokerError::fault("second"));

        assert!(signal.is_faulted());
        assert!(signal.reason().contains("link lost"));
    }
}
