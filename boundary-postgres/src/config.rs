//! Postgres-specific configuration: the SQL a [`TransactionIsolation`]
//! maps to, the store's own settings (`eventstore.*`), and
//! lookup tables the fetchers index topic/view configuration by name
//! through.
use std::collections::HashMap;

use boundary_core::config::{EventStoreConfig, OutboxConfig, TagPredicate, TransactionIsolation, ViewConfig, ViewsConfig};

/// [`EventStoreConfig`] plus the SQL statement used to set each isolation
/// level on a freshly opened transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgEventStoreConfig {
    pub persist_commands: bool,
    pub transaction_isolation: PgTransactionIsolation,
    pub fetch_size: u32,
}

impl From<EventStoreConfig> for PgEventStoreConfig {
    fn from(config: EventStoreConfig) -> Self {
        Self {
            persist_commands: config.persist_commands,
            transaction_isolation: PgTransactionIsolation(config.transaction_isolation),
            fetch_size: config.fetch_size,
        }
    }
}

impl Default for PgEventStoreConfig {
    fn default() -> Self {
        EventStoreConfig::default().into()
    }
}

/// Newtype over [`TransactionIsolation`] so this crate can render it as SQL
/// without `boundary-core` needing to know about SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgTransactionIsolation(pub TransactionIsolation);

impl PgTransactionIsolation {
    pub fn as_sql(&self) -> &'static str {
        match self.0 {
            TransactionIsolation::ReadCommitted => {
                "SET TRANSACTION ISOLATION LEVEL READ COMMITTED"
            }
            TransactionIsolation::RepeatableRead => {
                "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ"
            }
            TransactionIsolation::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

/// Maps outbox topic name to its tag predicate, so [`crate::fetcher::PgOutboxFetcher`]
/// can look a topic's filter up by the name half of an [`boundary_core::OutboxProcessorKey`].
#[derive(Debug, Clone, Default)]
pub struct OutboxTopicPredicates(HashMap<String, TagPredicate>);

impl OutboxTopicPredicates {
    pub fn get(&self, topic: &str) -> Option<&TagPredicate> {
        self.0.get(topic)
    }
}

impl From<&OutboxConfig> for OutboxTopicPredicates {
    fn from(config: &OutboxConfig) -> Self {
        Self(
            config
                .topics
                .iter()
                .map(|topic| (topic.name.clone(), topic.predicate.clone()))
                .collect(),
        )
    }
}

/// Maps view name to its subscription, so [`crate::fetcher::PgViewFetcher`]
/// can look a view's filter up by name.
#[derive(Debug, Clone, Default)]
pub struct ViewSubscriptions(HashMap<String, ViewConfig>);

impl ViewSubscriptions {
    pub fn get(&self, view_name: &str) -> Option<&ViewConfig> {
        self.0.get(view_name)
    }
}

impl From<&ViewsConfig> for ViewSubscriptions {
    fn from(config: &ViewsConfig) -> Self {
        Self(
            config
                .views
                .iter()
                .map(|view| (view.view_name.clone(), view.clone()))
                .collect(),
        )
    }
}
