//! Plain configuration records, one per component, replacing an
//! annotation-driven configuration framework with ordinary structs a host
//! application can deserialize from whatever format it likes (TOML, YAML,
//! environment variables) before constructing the core's types.
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Isolation level the event store opens its write transactions with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionIsolation {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Default for TransactionIsolation {
    fn default() -> Self {
        Self::ReadCommitted
    }
}

/// Configuration for the event store (`eventstore.*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventStoreConfig {
    pub persist_commands: bool,
    pub transaction_isolation: TransactionIsolation,
    pub fetch_size: u32,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            persist_commands: true,
            transaction_isolation: TransactionIsolation::default(),
            fetch_size: 1000,
        }
    }
}

/// Backoff parameters shared by the outbox and views schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub enabled: bool,
    pub threshold: u32,
    pub multiplier: u32,
    pub max_seconds: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 5,
            multiplier: 2,
            max_seconds: 30,
        }
    }
}

impl BackoffConfig {
    /// The delay before the next poll, given `consecutive_empty` empty
    /// batches in a row and the scheduler's configured `base_interval`.
    pub fn next_delay(&self, base_interval: Duration, consecutive_empty: u32) -> Duration {
        if !self.enabled || consecutive_empty < self.threshold {
            return base_interval;
        }
        let exponent = consecutive_empty - self.threshold;
        let multiplier = (self.multiplier as u64).saturating_pow(exponent);
        let backed_off_ms = base_interval.as_millis() as u64 * multiplier;
        let max_ms = self.max_seconds * 1000;
        Duration::from_millis(backed_off_ms.min(max_ms))
    }
}

/// Predicate a topic or view subscription matches events against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagPredicate {
    /// Event must carry all of these tag keys (value ignored).
    pub required_tags: Vec<String>,
    /// Event must carry at least one of these tag keys, if non-empty.
    pub any_of_tags: Vec<String>,
    /// Event must carry these exact `key=value` pairs.
    pub exact_tag_values: Vec<(String, String)>,
}

/// One outbox topic: the predicate it routes on, and the publishers that
/// receive events matching it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    pub name: String,
    #[serde(default)]
    pub predicate: TagPredicate,
    pub publishers: Vec<String>,
}

/// Configuration for the outbox processor family (`outbox.*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    pub enabled: bool,
    pub batch_size: u32,
    pub polling_interval_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub heartbeat_ttl_seconds: u64,
    pub topics: Vec<TopicConfig>,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 100,
            polling_interval_ms: 500,
            max_retries: 10,
            retry_delay_ms: 1000,
            heartbeat_ttl_seconds: 30,
            topics: Vec::new(),
        }
    }
}

/// One view subscription: the event types and tag predicate it reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfig {
    pub view_name: String,
    #[serde(default)]
    pub event_types: Vec<String>,
    #[serde(default)]
    pub required_tags: Vec<String>,
    #[serde(default)]
    pub any_of_tags: Vec<String>,
}

/// Configuration for the views processor family (`views.*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewsConfig {
    pub enabled: bool,
    pub polling_interval_ms: u64,
    pub batch_size: u32,
    pub backoff: BackoffConfig,
    pub leader_election_retry_interval_ms: u64,
    pub views: Vec<ViewConfig>,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            polling_interval_ms: 500,
            batch_size: 200,
            backoff: BackoffConfig::default(),
            leader_election_retry_interval_ms: 1000,
            views: Vec::new(),
        }
    }
}
