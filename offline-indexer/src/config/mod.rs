//! Configuration for the offline indexer binary.

mod dependencies;

pub use dependencies::Dependencies;

use std::env;
use std::str::FromStr;
use std::time::Duration;

use offline_indexer_broker::{AckMode, DEFAULT_CHANNEL};
use offline_indexer_pipeline::{ConsumerConfig, ProducerConfig};
use tracing::info;

use crate::BridgeError;

/// Default Kafka broker address.
const DEFAULT_KAFKA_BROKER: &str = "localhost:9092";

/// Settings shared by both roles.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub channel: String,
    pub ack_mode: AckMode,
    pub transacted: bool,
    pub persistent: bool,
    /// Zero means messages never expire.
    pub time_to_live: Duration,
    pub durable: bool,
    pub client_id: Option<String>,
    /// Producer bound; zero is unbounded.
    pub stop_after_sent: u64,
    /// Consumer bound; zero is unbounded.
    pub stop_after_received: u64,
    pub verbose: bool,
    pub kafka_broker: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            ack_mode: AckMode::Auto,
            transacted: false,
            persistent: false,
            time_to_live: Duration::ZERO,
            durable: false,
            client_id: None,
            stop_after_sent: 0,
            stop_after_received: 0,
            verbose: false,
            kafka_broker: DEFAULT_KAFKA_BROKER.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OFFLINE_INDEXER_CHANNEL`: Channel name (default: SEARCH.ALL_INDEXES)
    /// - `OFFLINE_INDEXER_ACK_MODE`: AUTO_ACKNOWLEDGE, CLIENT_ACKNOWLEDGE,
    ///   DUPS_OK_ACKNOWLEDGE or SESSION_TRANSACTED (default: AUTO_ACKNOWLEDGE)
    /// - `OFFLINE_INDEXER_TRANSACTED`: Use transacted sessions (default: false)
    /// - `OFFLINE_INDEXER_PERSISTENT`: Persistent delivery (default: false)
    /// - `OFFLINE_INDEXER_TIME_TO_LIVE_MS`: Message time-to-live, 0 for none (default: 0)
    /// - `OFFLINE_INDEXER_DURABLE`: Register a durable client id (default: false)
    /// - `OFFLINE_INDEXER_CLIENT_ID`: Durable client id (default: unset)
    /// - `OFFLINE_INDEXER_STOP_AFTER_SENT`: Producer bound, 0 for none (default: 0)
    /// - `OFFLINE_INDEXER_STOP_AFTER_RECEIVED`: Consumer bound, 0 for none (default: 0)
    /// - `OFFLINE_INDEXER_VERBOSE`: Log sent payloads (default: false)
    /// - `KAFKA_BROKER`: Kafka broker address (default: localhost:9092)
    ///
    /// # Returns
    ///
    /// * `Ok(BridgeConfig)` - The loaded configuration
    /// * `Err(BridgeError::ConfigError)` - If a variable holds an unparseable value
    pub fn from_env() -> Result<Self, BridgeError> {
        let config = Self::from_lookup(|name| env::var(name).ok())?;
        info!(
            channel = %config.channel,
            ack_mode = %config.ack_mode,
            transacted = config.transacted,
            persistent = config.persistent,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load configuration from `lookup`, which returns the value of a
    /// variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BridgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let ttl_ms: u64 = parse(&lookup, "OFFLINE_INDEXER_TIME_TO_LIVE_MS")?.unwrap_or(0);

        Ok(Self {
            channel: lookup("OFFLINE_INDEXER_CHANNEL")
                .filter(|channel| !channel.trim().is_empty())
                .unwrap_or(defaults.channel),
            ack_mode: parse(&lookup, "OFFLINE_INDEXER_ACK_MODE")?.unwrap_or(defaults.ack_mode),
            transacted: flag(&lookup, "OFFLINE_INDEXER_TRANSACTED")?,
            persistent: flag(&lookup, "OFFLINE_INDEXER_PERSISTENT")?,
            time_to_live: Duration::from_millis(ttl_ms),
            durable: flag(&lookup, "OFFLINE_INDEXER_DURABLE")?,
            client_id: lookup("OFFLINE_INDEXER_CLIENT_ID"),
            stop_after_sent: parse(&lookup, "OFFLINE_INDEXER_STOP_AFTER_SENT")?.unwrap_or(0),
            stop_after_received: parse(&lookup, "OFFLINE_INDEXER_STOP_AFTER_RECEIVED")?
                .unwrap_or(0),
            verbose: flag(&lookup, "OFFLINE_INDEXER_VERBOSE")?,
            kafka_broker: lookup("KAFKA_BROKER").unwrap_or(defaults.kafka_broker),
        })
    }

    pub fn producer_config(&self, name: &str) -> ProducerConfig {
        ProducerConfig::default()
            .with_name(name)
            .with_channel(self.channel.clone())
            .with_transacted(self.transacted || self.ack_mode == AckMode::SessionTransacted)
            .with_persistent(self.persistent)
            .with_time_to_live(self.time_to_live)
            .with_stop_after(self.stop_after_sent)
            .with_verbose(self.verbose)
    }

    pub fn consumer_config(&self, name: &str) -> ConsumerConfig {
        ConsumerConfig {
            name: name.to_string(),
            channel: self.channel.clone(),
            transacted: self.transacted,
            ack_mode: self.ack_mode,
            durable: self.durable,
            client_id: self.client_id.clone(),
            stop_after: None,
        }
        .with_stop_after(self.stop_after_received)
    }
}

fn parse<T, F>(lookup: &F, name: &str) -> Result<Option<T>, BridgeError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| BridgeError::config(format!("Invalid value for {}: '{}' ({})", name, raw, e))),
    }
}

fn flag<F>(lookup: &F, name: &str) -> Result<bool, BridgeError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        _ => Err(BridgeError::config(format!(
            "Invalid value for {}: '{}' (expected true or false)",
            name, raw
        ))),
    }
}
