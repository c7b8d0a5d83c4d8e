//! The event store: the source of truth for everything else in this crate.
//!
//! Implementations persist events subject to a Dynamic Consistency
//! Boundary: an [`AppendCondition`] rather than a fixed aggregate decides
//! whether a batch of events may be appended. `execute_in_transaction` -
//! running caller logic and an append in one database transaction - is
//! deliberately not part of this trait: it needs a transaction-scoped
//! handle whose type differs per backend, and with only one backend this
//! crate targets, a concrete method on the backend's own store avoids the
//! GAT machinery a trait-level transaction handle would otherwise need.
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::append_condition::AppendCondition;
use crate::command::NewCommandRecord;
use crate::cursor::Cursor;
use crate::event::{NewEvent, PersistedEvent};
use crate::query::Query;

/// The outcome of a successful append: the transaction identifier the
/// events were written under, and the cursor of the last event in the
/// batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResult {
    transaction_id: i64,
    cursor: Cursor,
}

impl AppendResult {
    pub fn new(transaction_id: i64, cursor: Cursor) -> Self {
        Self {
            transaction_id,
            cursor,
        }
    }

    pub fn transaction_id(&self) -> i64 {
        self.transaction_id
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }
}

/// Storage and retrieval of events under a Dynamic Consistency Boundary.
#[async_trait]
pub trait EventStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Streams events matching `query`, strictly after `after`, in
    /// ascending position order.
    fn query<'a>(
        &'a self,
        query: &'a Query,
        after: Cursor,
    ) -> BoxStream<'a, Result<PersistedEvent, Self::Error>>;

    /// Appends `events` unconditionally. Fails only on infrastructure
    /// error.
    async fn append(&self, events: Vec<NewEvent>) -> Result<AppendResult, Self::Error>;

    /// Appends `events` iff `condition` holds (see the module-level DCB
    /// protocol this implements). Fails with a concurrency or idempotency
    /// error when the condition does not hold, or with an infrastructure
    /// error otherwise.
    async fn append_if(
        &self,
        events: Vec<NewEvent>,
        condition: AppendCondition,
    ) -> Result<AppendResult, Self::Error>;

    /// Persists a command record alongside the transaction that is
    /// currently active on this store handle. A no-op when command
    /// persistence is disabled by configuration.
    async fn store_command(&self, record: NewCommandRecord) -> Result<(), Self::Error>;
}
