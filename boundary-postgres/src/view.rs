//! The views processor cycle: fetch, project, and advance
//! position inside one transaction, so a read model and its recorded
//! position can never drift apart.
use async_trait::async_trait;
use boundary_core::{CycleOutcome, DynError, PersistedEvent, ProcessorCycle, ViewProcessorKey};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};

use crate::config::ViewSubscriptions;
use crate::error::Error;
use crate::predicate::push_tag_key_predicate;

/// A connection-aware counterpart to [`boundary_core::ViewProjector`]: the
/// core's contract cannot hand out a connection (it has no notion of
/// Postgres), but a view's upsert must commit in the same transaction as
/// the position advance, so this backend's cycle depends on this trait
/// instead.
#[async_trait]
pub trait PgViewProjector: Send + Sync {
    fn view_name(&self) -> &str;

    async fn handle_in_transaction(
        &self,
        tx: &mut PgConnection,
        batch: &[PersistedEvent],
    ) -> Result<(), DynError>;
}

fn row_to_event(row: sqlx::postgres::PgRow) -> PersistedEvent {
    let position: i64 = row.get("position");
    let event_type: String = row.get("event_type");
    let tags: Vec<String> = row.get("tags");
    let payload: Vec<u8> = row.get("payload");
    let transaction_id: i64 = row.get("transaction_id");
    let occurred_at: chrono::DateTime<chrono::Utc> = row.get("occurred_at");
    let tag_set = tags.into_iter().filter_map(|t| t.parse().ok()).collect();
    PersistedEvent::new(
        boundary_core::NewEvent::new(event_type, tag_set, payload),
        position,
        transaction_id,
        occurred_at.timestamp_micros(),
    )
}

/// Runs one view's fetch-project-advance cycle.
pub struct PgViewCycle {
    pool: PgPool,
    subscriptions: ViewSubscriptions,
    projectors: Vec<std::sync::Arc<dyn PgViewProjector>>,
}

impl PgViewCycle {
    pub fn new(
        pool: PgPool,
        subscriptions: ViewSubscriptions,
        projectors: Vec<std::sync::Arc<dyn PgViewProjector>>,
    ) -> Self {
        Self {
            pool,
            subscriptions,
            projectors,
        }
    }

    fn projector_for(&self, view_name: &str) -> Option<&std::sync::Arc<dyn PgViewProjector>> {
        self.projectors
            .iter()
            .find(|projector| projector.view_name() == view_name)
    }
}

#[async_trait]
impl ProcessorCycle<ViewProcessorKey> for PgViewCycle {
    type Error = Error;

    async fn run_cycle(
        &self,
        key: &ViewProcessorKey,
        after_position: i64,
        batch_size: u32,
    ) -> Result<CycleOutcome, Self::Error> {
        let subscription = self.subscriptions.get(&key.view_name).ok_or_else(|| {
            Error::SchemaNotInitialized("view not registered in configuration")
        })?;
        let projector = self.projector_for(&key.view_name).ok_or_else(|| {
            Error::SchemaNotInitialized("view has no registered projector")
        })?;

        let mut tx = self.pool.begin().await?;

        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT position, event_type, tags, payload, transaction_id::text::bigint AS transaction_id, occurred_at \
             FROM events WHERE position > ",
        );
        qb.push_bind(after_position);
        qb.push(" AND (");
        if subscription.event_types.is_empty() {
            qb.push("TRUE");
        } else {
            qb.push("event_type IN (");
            let mut separated = qb.separated(", ");
            for event_type in &subscription.event_types {
                separated.push_bind(event_type);
            }
            qb.push(")");
        }
        qb.push(") AND (");
        push_tag_key_predicate(
            &mut qb,
            &subscription.required_tags,
            &subscription.any_of_tags,
            &[],
        );
        qb.push(") ORDER BY position ASC LIMIT ");
        qb.push_bind(batch_size as i64);

        let rows = qb.build().fetch_all(&mut *tx).await?;
        let batch: Vec<PersistedEvent> = rows.into_iter().map(row_to_event).collect();

        if batch.is_empty() {
            tx.commit().await?;
            return Ok(CycleOutcome {
                events_handled: 0,
                new_position: after_position,
            });
        }

        let new_position = batch.last().expect("checked non-empty above").position();

        projector
            .handle_in_transaction(&mut tx, &batch)
            .await
            .map_err(Error::HandlerFailed)?;

        sqlx::query("UPDATE view_progress SET last_position = $2, last_updated_at = now() WHERE view_name = $1")
            .bind(&key.view_name)
            .bind(new_position)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(CycleOutcome {
            events_handled: batch.len() as u32,
            new_position,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use boundary_core::config::ViewsConfig;
    use boundary_core::tag::tags;
    use boundary_core::{NewEvent, ProgressTracker};
    use sqlx::PgPool;

    use super::*;
    use crate::event_store::PgEventStore;

    struct CountingProjector {
        view_name: String,
        handled: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PgViewProjector for CountingProjector {
        fn view_name(&self) -> &str {
            &self.view_name
        }

        async fn handle_in_transaction(
            &self,
            _tx: &mut PgConnection,
            batch: &[PersistedEvent],
        ) -> Result<(), DynError> {
            self.handled.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    async fn seed(pool: &PgPool) {
        crate::migrator::Migrator::new(pool)
            .init_event_store()
            .await
            .unwrap();
        crate::migrator::Migrator::new(pool).init_views().await.unwrap();
        crate::progress::PgViewProgressTracker::new(pool.clone())
            .auto_register(
                &ViewProcessorKey {
                    view_name: "account_balances".to_string(),
                },
                "instance-1",
            )
            .await
            .unwrap();
        let store = PgEventStore::new(pool.clone(), crate::config::PgEventStoreConfig::default());
        store
            .append(vec![NewEvent::new(
                "AccountOpened",
                tags([("account_id", "a1".into())]),
                b"{}".to_vec(),
            )])
            .await
            .unwrap();
    }

    fn subscriptions() -> ViewSubscriptions {
        use boundary_core::config::ViewConfig;
        let config = ViewsConfig {
            views: vec![ViewConfig {
                view_name: "account_balances".into(),
                event_types: vec!["AccountOpened".into()],
                required_tags: vec!["account_id".into()],
                any_of_tags: vec![],
            }],
            ..ViewsConfig::default()
        };
        (&config).into()
    }

    #[sqlx::test]
    async fn projects_a_batch_and_advances_position_atomically(pool: PgPool) {
        seed(&pool).await;
        let handled = Arc::new(AtomicUsize::new(0));
        let projector = Arc::new(CountingProjector {
            view_name: "account_balances".to_string(),
            handled: handled.clone(),
        });
        let cycle = PgViewCycle::new(pool.clone(), subscriptions(), vec![projector]);
        let key = ViewProcessorKey {
            view_name: "account_balances".to_string(),
        };

        let outcome = cycle.run_cycle(&key, 0, 10).await.unwrap();
        assert_eq!(outcome.events_handled, 1);
        assert_eq!(handled.load(Ordering::SeqCst), 1);

        let position: i64 = sqlx::query_scalar(
            "SELECT last_position FROM view_progress WHERE view_name = 'account_balances'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(position, outcome.new_position);
    }

    #[sqlx::test]
    async fn missing_projector_is_rejected(pool: PgPool) {
        seed(&pool).await;
        let cycle = PgViewCycle::new(pool, subscriptions(), vec![]);
        let key = ViewProcessorKey {
            view_name: "account_balances".to_string(),
        };
        let result = cycle.run_cycle(&key, 0, 10).await;
        assert!(matches!(result, Err(Error::SchemaNotInitialized(_))));
    }
}
