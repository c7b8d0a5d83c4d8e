//! Event fetching for the outbox and views processor families.
use async_trait::async_trait;
use boundary_core::{EventFetcher, NewEvent, OutboxProcessorKey, PersistedEvent, ViewProcessorKey};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::config::{OutboxTopicPredicates, ViewSubscriptions};
use crate::error::Error;
use crate::predicate::push_tag_key_predicate;

fn row_to_event(row: PgRow) -> PersistedEvent {
    let position: i64 = row.get("position");
    let event_type: String = row.get("event_type");
    let tags: Vec<String> = row.get("tags");
    let payload: Vec<u8> = row.get("payload");
    let transaction_id: i64 = row.get("transaction_id");
    let occurred_at: chrono::DateTime<chrono::Utc> = row.get("occurred_at");

    let tag_set = tags.into_iter().filter_map(|t| t.parse().ok()).collect();
    PersistedEvent::new(
        NewEvent::new(event_type, tag_set, payload),
        position,
        transaction_id,
        occurred_at.timestamp_micros(),
    )
}

/// Fetches events matching one outbox topic's [`boundary_core::config::TagPredicate`].
pub struct PgOutboxFetcher {
    pool: PgPool,
    predicates: OutboxTopicPredicates,
}

impl PgOutboxFetcher {
    pub fn new(pool: PgPool, predicates: OutboxTopicPredicates) -> Self {
        Self { pool, predicates }
    }
}

#[async_trait]
impl EventFetcher<OutboxProcessorKey> for PgOutboxFetcher {
    type Error = Error;

    async fn fetch_batch(
        &self,
        key: &OutboxProcessorKey,
        after_position: i64,
        batch_size: u32,
    ) -> Result<Vec<PersistedEvent>, Self::Error> {
        let predicate = self.predicates.get(&key.topic).ok_or_else(|| {
            Error::SchemaNotInitialized("outbox topic not registered in configuration")
        })?;

        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT position, event_type, tags, payload, transaction_id::text::bigint AS transaction_id, occurred_at \
             FROM events WHERE position > ",
        );
        qb.push_bind(after_position);
        qb.push(" AND (");
        push_tag_key_predicate(
            &mut qb,
            &predicate.required_tags,
            &predicate.any_of_tags,
            &predicate.exact_tag_values,
        );
        qb.push(") ORDER BY position ASC LIMIT ");
        qb.push_bind(batch_size as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(row_to_event).collect())
    }
}

/// Fetches events matching one view's subscription (event types plus tag
/// predicate).
pub struct PgViewFetcher {
    pool: PgPool,
    subscriptions: ViewSubscriptions,
}

impl PgViewFetcher {
    pub fn new(pool: PgPool, subscriptions: ViewSubscriptions) -> Self {
        Self { pool, subscriptions }
    }
}

#[async_trait]
impl EventFetcher<ViewProcessorKey> for PgViewFetcher {
    type Error = Error;

    async fn fetch_batch(
        &self,
        key: &ViewProcessorKey,
        after_position: i64,
        batch_size: u32,
    ) -> Result<Vec<PersistedEvent>, Self::Error> {
        let subscription = self
            .subscriptions
            .get(&key.view_name)
            .ok_or_else(|| Error::SchemaNotInitialized("view not registered in configuration"))?;

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

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(row_to_event).collect())
    }
}

#[cfg(test)]
mod tests {
    use boundary_core::config::{OutboxConfig, TagPredicate, TopicConfig, ViewConfig, ViewsConfig};
    use boundary_core::tag::tags;
    use sqlx::PgPool;

    use super::*;
    use crate::event_store::PgEventStore;

    async fn seed(pool: &PgPool) {
        crate::migrator::Migrator::new(pool)
            .init_event_store()
            .await
            .unwrap();
        let store = PgEventStore::new(pool.clone(), crate::config::PgEventStoreConfig::default());
        store
            .append(vec![
                NewEvent::new(
                    "AccountOpened",
                    tags([("account_id", "a1".into())]),
                    b"{}".to_vec(),
                ),
                NewEvent::new("UnrelatedThing", std::collections::BTreeSet::new(), b"{}".to_vec()),
            ])
            .await
            .unwrap();
    }

    #[sqlx::test]
    async fn outbox_fetcher_filters_by_the_topic_predicate(pool: PgPool) {
        seed(&pool).await;
        let config = OutboxConfig {
            topics: vec![TopicConfig {
                name: "payments".into(),
                predicate: TagPredicate {
                    required_tags: vec!["account_id".into()],
                    ..Default::default()
                },
                publishers: vec!["webhook-a".into()],
            }],
            ..OutboxConfig::default()
        };
        let fetcher = PgOutboxFetcher::new(pool, (&config).into());
        let key = OutboxProcessorKey {
            topic: "payments".to_string(),
            publisher: "webhook-a".to_string(),
        };

        let batch = fetcher.fetch_batch(&key, 0, 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].event_type(), "AccountOpened");
    }

    #[sqlx::test]
    async fn outbox_fetcher_filters_by_exact_tag_values(pool: PgPool) {
        crate::migrator::Migrator::new(&pool)
            .init_event_store()
            .await
            .unwrap();
        let store = PgEventStore::new(pool.clone(), crate::config::PgEventStoreConfig::default());
        store
            .append(vec![
                NewEvent::new(
                    "AccountOpened",
                    tags([("account_id", "a1".into()), ("tier", "premium".into())]),
                    b"{}".to_vec(),
                ),
                NewEvent::new(
                    "AccountOpened",
                    tags([("account_id", "a2".into()), ("tier", "standard".into())]),
                    b"{}".to_vec(),
                ),
            ])
            .await
            .unwrap();

        let config = OutboxConfig {
            topics: vec![TopicConfig {
                name: "premium-notifications".into(),
                predicate: TagPredicate {
                    exact_tag_values: vec![("tier".into(), "premium".into())],
                    ..Default::default()
                },
                publishers: vec!["webhook-a".into()],
            }],
            ..OutboxConfig::default()
        };
        let fetcher = PgOutboxFetcher::new(pool, (&config).into());
        let key = OutboxProcessorKey {
            topic: "premium-notifications".to_string(),
            publisher: "webhook-a".to_string(),
        };

        let batch = fetcher.fetch_batch(&key, 0, 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch[0].tags().iter().any(|t| t.to_string() == "account_id=a1"));
    }

    #[sqlx::test]
    async fn outbox_fetcher_errors_on_an_unregistered_topic(pool: PgPool) {
        seed(&pool).await;
        let fetcher = PgOutboxFetcher::new(pool, OutboxTopicPredicates::default());
        let key = OutboxProcessorKey {
            topic: "unknown".to_string(),
            publisher: "webhook-a".to_string(),
        };
        let result = fetcher.fetch_batch(&key, 0, 10).await;
        assert!(matches!(result, Err(Error::SchemaNotInitialized(_))));
    }

    #[sqlx::test]
    async fn view_fetcher_filters_by_event_type_and_tags(pool: PgPool) {
        seed(&pool).await;
        let config = ViewsConfig {
            views: vec![ViewConfig {
                view_name: "account_balances".into(),
                event_types: vec!["AccountOpened".into()],
                required_tags: vec!["account_id".into()],
                any_of_tags: vec![],
            }],
            ..ViewsConfig::default()
        };
        let fetcher = PgViewFetcher::new(pool, (&config).into());
        let key = ViewProcessorKey {
            view_name: "account_balances".to_string(),
        };

        let batch = fetcher.fetch_batch(&key, 0, 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].event_type(), "AccountOpened");
    }
}
