//! The outbox processor cycle: fetch events matching a
//! topic's predicate and dispatch them to that topic's publisher.
use std::sync::Arc;

use async_trait::async_trait;
use boundary_core::{CycleOutcome, OutboxProcessorKey, OutboxPublisher, ProcessorCycle, PublishMode};

use crate::config::OutboxTopicPredicates;
use crate::error::Error;
use crate::fetcher::PgOutboxFetcher;
use crate::progress::PgOutboxProgressTracker;

/// Runs one outbox topic/publisher pair's fetch-dispatch-advance cycle.
///
/// Dispatch to an external publisher is not transactional with the
/// position advance (there is no database transaction spanning an HTTP
/// call or a message broker publish); publishers are required to be
/// idempotent so at-least-once redelivery after a crash between dispatch
/// and `update_progress` is safe.
pub struct PgOutboxCycle {
    fetcher: PgOutboxFetcher,
    tracker: Arc<PgOutboxProgressTracker>,
    publishers: Vec<Arc<dyn OutboxPublisher>>,
}

impl PgOutboxCycle {
    pub fn new(
        pool: sqlx::PgPool,
        predicates: OutboxTopicPredicates,
        tracker: Arc<PgOutboxProgressTracker>,
        publishers: Vec<Arc<dyn OutboxPublisher>>,
    ) -> Self {
        Self {
            fetcher: PgOutboxFetcher::new(pool, predicates),
            tracker,
            publishers,
        }
    }

    fn publisher_for(&self, name: &str) -> Option<&Arc<dyn OutboxPublisher>> {
        self.publishers.iter().find(|publisher| publisher.name() == name)
    }
}

#[async_trait]
impl ProcessorCycle<OutboxProcessorKey> for PgOutboxCycle {
    type Error = Error;

    async fn run_cycle(
        &self,
        key: &OutboxProcessorKey,
        after_position: i64,
        batch_size: u32,
    ) -> Result<CycleOutcome, Self::Error> {
        use boundary_core::{EventFetcher, ProgressTracker};

        let publisher = self.publisher_for(&key.publisher).ok_or_else(|| {
            Error::SchemaNotInitialized("outbox publisher not registered")
        })?;

        if !publisher.is_healthy().await {
            return Ok(CycleOutcome {
                events_handled: 0,
                new_position: after_position,
            });
        }

        let batch = self.fetcher.fetch_batch(key, after_position, batch_size).await?;
        if batch.is_empty() {
            return Ok(CycleOutcome {
                events_handled: 0,
                new_position: after_position,
            });
        }

        match publisher.preferred_mode() {
            PublishMode::Batch => {
                publisher.publish_batch(&batch).await.map_err(Error::HandlerFailed)?;
            }
            PublishMode::Individual => {
                for event in &batch {
                    publisher
                        .publish_batch(std::slice::from_ref(event))
                        .await
                        .map_err(Error::HandlerFailed)?;
                }
            }
        }

        let new_position = batch.last().expect("checked non-empty above").position();
        self.tracker.update_progress(key, new_position).await?;

        Ok(CycleOutcome {
            events_handled: batch.len() as u32,
            new_position,
        })
    }
}
