//! Event fetching for dispatch (C7), generic over the processor key type
//! `K`. Each processor family supplies its own filtering semantics (topic
//! tag predicates for outbox, subscription predicates for views) behind
//! this one contract.
use async_trait::async_trait;

use crate::event::PersistedEvent;

/// Fetches batches of events for one processor, filtered per that
/// processor's own predicate.
#[async_trait]
pub trait EventFetcher<K>: Send + Sync
where
    K: Send + Sync,
{
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns up to `batch_size` events matching `key`'s filter, strictly
    /// after `after_position`, in ascending position order.
    async fn fetch_batch(
        &self,
        key: &K,
        after_position: i64,
        batch_size: u32,
    ) -> Result<Vec<PersistedEvent>, Self::Error>;
}
