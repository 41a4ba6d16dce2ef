//! Message, delivery and acknowledgement types shared by all brokers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::errors::BrokerError;

/// Channel both roles bind to unless configured otherwise.
pub const DEFAULT_CHANNEL: &str = "SEARCH.ALL_INDEXES";

/// How received messages are acknowledged to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// The broker considers a message delivered as soon as it is received.
    #[default]
    Auto,
    /// The consumer acknowledges each message explicitly.
    Client,
    /// Lazy acknowledgement; duplicates are tolerated.
    DupsOk,
    /// Delivery is settled by committing the session.
    SessionTransacted,
}

impl AckMode {
    /// Whether a received message must be acknowledged explicitly.
    pub fn requires_explicit_ack(&self) -> bool {
        matches!(self, AckMode::Client)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AckMode::Auto => "AUTO_ACKNOWLEDGE",
            AckMode::Client => "CLIENT_ACKNOWLEDGE",
            AckMode::DupsOk => "DUPS_OK_ACKNOWLEDGE",
            AckMode::SessionTransacted => "SESSION_TRANSACTED",
        }
    }
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AckMode {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "auto" | "auto-acknowledge" => Ok(AckMode::Auto),
            "client" | "client-ack" | "client-acknowledge" => Ok(AckMode::Client),
            "dups-ok" | "dups-ok-acknowledge" => Ok(AckMode::DupsOk),
            "transacted" | "session-transacted" => Ok(AckMode::SessionTransacted),
            other => Err(BrokerError::config(format!(
                "Unknown acknowledgement mode: {}",
                other
            ))),
        }
    }
}

/// Whether the broker must keep a message across its own restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    Persistent,
    #[default]
    NonPersistent,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Persistent => "persistent",
            DeliveryMode::NonPersistent => "non-persistent",
        }
    }
}

/// Per-send delivery settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryOptions {
    pub mode: DeliveryMode,
    /// How long the message stays deliverable. `None` never expires.
    pub time_to_live: Option<Duration>,
}

impl DeliveryOptions {
    /// Build options from the configuration surface, where a zero
    /// time-to-live means the message never expires.
    pub fn new(persistent: bool, time_to_live: Duration) -> Self {
        Self {
            mode: if persistent {
                DeliveryMode::Persistent
            } else {
                DeliveryMode::NonPersistent
            },
            time_to_live: (!time_to_live.is_zero()).then_some(time_to_live),
        }
    }
}

/// Where a received message sits in its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub channel: String,
    pub partition: i32,
    pub offset: i64,
}

/// A single broker message: one opaque payload plus string headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub payload: Vec<u8>,
    pub headers: BTreeMap<String, String>,
    pub sent_at: Option<DateTime<Utc>>,
    receipt: Option<Receipt>,
}

impl BrokerMessage {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            headers: BTreeMap::new(),
            sent_at: None,
            receipt: None,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Channel position of a received message; `None` before it was sent.
    pub fn receipt(&self) -> Option<&Receipt> {
        self.receipt.as_ref()
    }

    pub(crate) fn set_receipt(&mut self, receipt: Receipt) {
        self.receipt = Some(receipt);
    }
}
