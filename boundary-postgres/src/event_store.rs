//! The Postgres-backed event store: implements the Dynamic Consistency
//! Boundary append protocol against the `events` table.
//!
//! `append_if`'s three steps - idempotency check, concurrency check,
//! insert - run as bound queries against one `sqlx::Transaction`, which is
//! this module's "single callable unit" sharing one transaction and one
//! snapshot (rather than a literal PL/pgSQL stored procedure): the
//! predicates a caller supplies are arbitrary per-call `Query` values, and
//! building those dynamically inside PL/pgSQL would need the same
//! string-building this module already does in Rust, with less type
//! safety. See `DESIGN.md` for the full rationale.
use std::sync::Arc;

use async_trait::async_trait;
use boundary_core::{AppendCondition, NewCommandRecord, NewEvent, PersistedEvent, Query};
use boundary_core::{AppendResult, Cursor, EventStore};
use boundary_core::{EventDecoder, Projected, ProjectError, Projection};
use futures::stream::BoxStream;
use futures::StreamExt;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tokio::sync::Mutex;

use crate::config::PgEventStoreConfig;
use crate::error::Error;
use crate::predicate::{advisory_lock_key, push_query};

fn row_to_event(row: PgRow) -> PersistedEvent {
    let position: i64 = row.get("position");
    let event_type: String = row.get("event_type");
    let tags: Vec<String> = row.get("tags");
    let payload: Vec<u8> = row.get("payload");
    let transaction_id: i64 = row.get::<i64, _>("transaction_id");
    let occurred_at: chrono::DateTime<chrono::Utc> = row.get("occurred_at");

    let tag_set = tags
        .into_iter()
        .filter_map(|t| t.parse().ok())
        .collect();

    PersistedEvent::new(
        NewEvent::new(event_type, tag_set, payload),
        position,
        transaction_id,
        occurred_at.timestamp_micros(),
    )
}

async fn insert_events<'c, E>(executor: E, events: &[NewEvent]) -> Result<AppendResult, Error>
where
    E: sqlx::PgExecutor<'c>,
{
    let mut qb = QueryBuilder::<Postgres>::new(
        "INSERT INTO events (event_type, tags, payload) ",
    );
    qb.push_values(events, |mut b, event| {
        b.push_bind(event.event_type())
            .push_bind(
                event
                    .tags()
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<String>>(),
            )
            .push_bind(event.payload());
    });
    qb.push(" RETURNING position, transaction_id::text::bigint AS transaction_id, occurred_at");

    let rows = qb.build().fetch_all(executor).await?;
    let mut last_position = 0;
    let mut last_occurred_at = 0;
    let mut transaction_id = 0;
    for row in &rows {
        let position: i64 = row.get(0);
        let txid: i64 = row.get(1);
        let occurred_at: chrono::DateTime<chrono::Utc> = row.get(2);
        last_position = last_position.max(position);
        transaction_id = txid;
        last_occurred_at = occurred_at.timestamp_micros();
    }
    Ok(AppendResult::new(
        transaction_id,
        Cursor::new(last_position, last_occurred_at, transaction_id),
    ))
}

async fn idempotency_check<'c>(
    tx: &mut Transaction<'c, Postgres>,
    already_exists: &Query,
) -> Result<(), Error> {
    let lock_key = advisory_lock_key(already_exists);
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(lock_key)
        .execute(&mut **tx)
        .await?;

    let mut qb = QueryBuilder::<Postgres>::new("SELECT EXISTS (SELECT 1 FROM events WHERE ");
    push_query(&mut qb, already_exists);
    qb.push(")");
    let exists: bool = qb.build_query_scalar().fetch_one(&mut **tx).await?;
    if exists {
        return Err(Error::Idempotency);
    }
    Ok(())
}

async fn concurrency_check<'c>(
    tx: &mut Transaction<'c, Postgres>,
    state_changed: &Query,
    after: Cursor,
) -> Result<(), Error> {
    let xmin: i64 =
        sqlx::query_scalar("SELECT pg_snapshot_xmin(pg_current_snapshot())::text::bigint")
            .fetch_one(&mut **tx)
            .await?;

    let mut qb = QueryBuilder::<Postgres>::new("SELECT EXISTS (SELECT 1 FROM events WHERE position > ");
    qb.push_bind(after.position());
    qb.push(" AND transaction_id < ");
    qb.push_bind(xmin);
    qb.push("::text::xid8 AND (");
    push_query(&mut qb, state_changed);
    qb.push("))");
    let exists: bool = qb.build_query_scalar().fetch_one(&mut **tx).await?;
    if exists {
        return Err(Error::Concurrency);
    }
    Ok(())
}

fn query_stream<'a, 'c, E>(
    executor: E,
    query: &'a Query,
    after: Cursor,
) -> BoxStream<'a, Result<PersistedEvent, Error>>
where
    E: sqlx::PgExecutor<'c> + 'a,
{
    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT position, event_type, tags, payload, transaction_id::text::bigint AS transaction_id, occurred_at FROM events WHERE position > ",
    );
    qb.push_bind(after.position());
    qb.push(" AND (");
    push_query(&mut qb, query);
    qb.push(") ORDER BY position ASC");

    qb.build()
        .fetch(executor)
        .map(|row| row.map(row_to_event).map_err(Error::from))
        .boxed()
}

/// The Postgres-backed event store.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
    config: PgEventStoreConfig,
}

impl PgEventStore {
    pub fn new(pool: PgPool, config: PgEventStoreConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &PgEventStoreConfig {
        &self.config
    }

    /// Runs `work` inside a single database transaction: every store
    /// operation `work` invokes on the [`PgTransactionalStore`] it receives
    /// shares that transaction, and the transaction id any inner
    /// `append_if` returns is the outer transaction's id.
    ///
    /// Commits if `work` returns `Ok`; rolls back (by dropping the
    /// transaction) otherwise.
    pub async fn execute_in_transaction<F, Fut, R>(&self, work: F) -> Result<R, Error>
    where
        F: FnOnce(PgTransactionalStore) -> Fut,
        Fut: std::future::Future<Output = Result<R, Error>>,
    {
        let mut tx = self.pool.begin().await?;
        sqlx::query(self.config.transaction_isolation.as_sql())
            .execute(&mut *tx)
            .await?;
        let inner = Arc::new(Mutex::new(Some(tx)));
        let store = PgTransactionalStore {
            tx: inner.clone(),
            persist_commands: self.config.persist_commands,
        };
        let result = work(store).await;
        let tx = inner
            .lock()
            .await
            .take()
            .expect("execute_in_transaction: transaction consumed by a previous call");
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    type Error = Error;

    fn query<'a>(
        &'a self,
        query: &'a Query,
        after: Cursor,
    ) -> BoxStream<'a, Result<PersistedEvent, Self::Error>> {
        query_stream(&self.pool, query, after)
    }

    async fn append(&self, events: Vec<NewEvent>) -> Result<AppendResult, Self::Error> {
        if events.is_empty() {
            return Ok(AppendResult::new(0, Cursor::ZERO));
        }
        insert_events(&self.pool, &events).await
    }

    async fn append_if(
        &self,
        events: Vec<NewEvent>,
        condition: AppendCondition,
    ) -> Result<AppendResult, Self::Error> {
        let mut tx = self.pool.begin().await?;

        if let Some(already_exists) = condition.already_exists() {
            idempotency_check(&mut tx, already_exists).await?;
        }
        if let Some(state_changed) = condition.state_changed() {
            concurrency_check(&mut tx, state_changed, condition.after()).await?;
        }

        let result = insert_events(&mut *tx, &events).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn store_command(&self, record: NewCommandRecord) -> Result<(), Self::Error> {
        if !self.config.persist_commands {
            return Ok(());
        }
        sqlx::query(
            "INSERT INTO commands (transaction_id, command_type, payload) VALUES (pg_current_xact_id(), $1, $2)",
        )
        .bind(record.command_type())
        .bind(record.payload())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// A handle to one in-flight transaction, handed to
/// [`PgEventStore::execute_in_transaction`]'s callback. Every method shares
/// the same underlying `sqlx::Transaction`.
#[derive(Clone)]
pub struct PgTransactionalStore {
    tx: Arc<Mutex<Option<Transaction<'static, Postgres>>>>,
    persist_commands: bool,
}

#[async_trait]
impl EventStore for PgTransactionalStore {
    type Error = Error;

    fn query<'a>(
        &'a self,
        _query: &'a Query,
        _after: Cursor,
    ) -> BoxStream<'a, Result<PersistedEvent, Self::Error>> {
        unimplemented!(
            "streaming query is not available inside execute_in_transaction; \
             use query_events or project_in_transaction, which buffer the matching \
             events instead"
        )
    }

    async fn append(&self, events: Vec<NewEvent>) -> Result<AppendResult, Self::Error> {
        if events.is_empty() {
            return Ok(AppendResult::new(0, Cursor::ZERO));
        }
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("transaction already finished");
        insert_events(&mut **tx, &events).await
    }

    async fn append_if(
        &self,
        events: Vec<NewEvent>,
        condition: AppendCondition,
    ) -> Result<AppendResult, Self::Error> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("transaction already finished");

        if let Some(already_exists) = condition.already_exists() {
            idempotency_check(tx, already_exists).await?;
        }
        if let Some(state_changed) = condition.state_changed() {
            concurrency_check(tx, state_changed, condition.after()).await?;
        }
        insert_events(&mut **tx, &events).await
    }

    async fn store_command(&self, record: NewCommandRecord) -> Result<(), Self::Error> {
        if !self.persist_commands {
            return Ok(());
        }
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("transaction already finished");
        sqlx::query(
            "INSERT INTO commands (transaction_id, command_type, payload) VALUES (pg_current_xact_id(), $1, $2)",
        )
        .bind(record.command_type())
        .bind(record.payload())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

impl PgTransactionalStore {
    /// Streams (eagerly - within a transaction there is no long-lived
    /// borrow to hand out a lazy stream from a mutex-guarded connection)
    /// the events matching `query` after `after`, for handlers that need
    /// to project state before deciding what to append.
    pub async fn query_events(
        &self,
        query: &Query,
        after: Cursor,
    ) -> Result<Vec<PersistedEvent>, Error> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("transaction already finished");
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT position, event_type, tags, payload, transaction_id::text::bigint AS transaction_id, occurred_at FROM events WHERE position > ",
        );
        qb.push_bind(after.position());
        qb.push(" AND (");
        push_query(&mut qb, query);
        qb.push(") ORDER BY position ASC");
        let rows = qb.build().fetch_all(&mut **tx).await?;
        Ok(rows.into_iter().map(row_to_event).collect())
    }

    /// Folds `query_events(query, after)` into a projection, the same way
    /// `boundary_core::projector::project` folds a lazy stream outside a
    /// transaction. A command handler uses this to hydrate the state its
    /// decision needs before returning the events and append condition to
    /// apply against that same state.
    pub async fn project_in_transaction<P, D>(
        &self,
        query: &Query,
        after: Cursor,
        decoder: &D,
    ) -> Result<Projected<P>, ProjectError<Error, D::Error>>
    where
        P: Projection,
        D: EventDecoder<P::Event>,
    {
        let events = self
            .query_events(query, after)
            .await
            .map_err(ProjectError::Store)?;
        let mut state = P::initial_state();
        let mut cursor = after;
        for event in &events {
            let decoded = decoder
                .decode(event.event_type(), event.payload())
                .map_err(ProjectError::Decode)?;
            cursor = event.cursor();
            state.apply(decoded);
        }
        Ok(Projected { state, cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boundary_core::tag::tags;
    use sqlx::{Postgres, QueryBuilder};

    #[test]
    fn push_query_renders_true_for_the_empty_query() {
        let mut qb = QueryBuilder::<Postgres>::new("");
        push_query(&mut qb, &Query::all());
        assert_eq!(qb.sql(), "TRUE");
    }

    #[test]
    fn push_query_renders_type_and_tag_clauses() {
        let q = Query::by_tags(tags([("account_id", "a1".into())]));
        let mut qb = QueryBuilder::<Postgres>::new("");
        push_query(&mut qb, &q);
        assert_eq!(qb.sql(), "((tags @> $1::text[]))");
    }

    fn opened(account: &str) -> NewEvent {
        NewEvent::new(
            "AccountOpened",
            tags([("account_id", account.into())]),
            b"{}".to_vec(),
        )
    }

    fn withdrawn(account: &str, amount: i64) -> NewEvent {
        NewEvent::new(
            "Withdrawn",
            tags([("account_id", account.into())]),
            format!("{{\"amount\":{amount}}}").into_bytes(),
        )
    }

    #[sqlx::test]
    async fn append_then_query_returns_events_in_position_order(pool: PgPool) {
        crate::migrator::Migrator::new(&pool)
            .init_event_store()
            .await
            .unwrap();
        let store = PgEventStore::new(pool, PgEventStoreConfig::default());

        store
            .append(vec![opened("a1"), withdrawn("a1", 10)])
            .await
            .unwrap();

        let query = Query::by_tags(tags([("account_id", "a1".into())]));
        let events: Vec<_> = store
            .query(&query, Cursor::ZERO)
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), "AccountOpened");
        assert_eq!(events[1].event_type(), "Withdrawn");
        assert!(events[0].position() < events[1].position());
    }

    #[sqlx::test]
    async fn append_if_rejects_a_concurrent_state_change(pool: PgPool) {
        crate::migrator::Migrator::new(&pool)
            .init_event_store()
            .await
            .unwrap();
        let store = PgEventStore::new(pool, PgEventStoreConfig::default());

        store.append(vec![opened("a1")]).await.unwrap();
        let query = Query::by_tags(tags([("account_id", "a1".into())]));
        let observed: Vec<_> = store
            .query(&query, Cursor::ZERO)
            .map(|r| r.unwrap())
            .collect()
            .await;
        let stale_after = observed.last().unwrap().cursor();

        // A withdrawal that observed the account right after it was opened
        // appends cleanly: nothing matching the query has happened since.
        store
            .append_if(
                vec![withdrawn("a1", 10)],
                AppendCondition::new(stale_after, query.clone()),
            )
            .await
            .unwrap();

        // A second, concurrently-decided withdrawal still holding the same
        // stale cursor must be rejected: the first withdrawal already
        // changed the account's state underneath it.
        let result = store
            .append_if(
                vec![withdrawn("a1", 20)],
                AppendCondition::new(stale_after, query),
            )
            .await;

        assert!(matches!(result, Err(Error::Concurrency)));
    }

    #[sqlx::test]
    async fn append_if_is_idempotent_on_a_repeated_command(pool: PgPool) {
        crate::migrator::Migrator::new(&pool)
            .init_event_store()
            .await
            .unwrap();
        let store = PgEventStore::new(pool, PgEventStoreConfig::default());

        let already_exists = Query::by_tags(tags([("account_id", "a1".into())]));
        let condition = AppendCondition::idempotent_on(already_exists);

        let first = store
            .append_if(vec![opened("a1")], condition.clone())
            .await
            .unwrap();
        assert!(first.transaction_id() > 0);

        let second = store.append_if(vec![opened("a1")], condition).await;
        assert!(matches!(second, Err(Error::Idempotency)));
    }

    #[sqlx::test]
    async fn execute_in_transaction_rolls_back_on_handler_error(pool: PgPool) {
        crate::migrator::Migrator::new(&pool)
            .init_event_store()
            .await
            .unwrap();
        let store = PgEventStore::new(pool.clone(), PgEventStoreConfig::default());

        let result: Result<(), Error> = store
            .execute_in_transaction(|tx_store| async move {
                tx_store.append(vec![opened("a1")]).await?;
                Err(Error::Concurrency)
            })
            .await;
        assert!(result.is_err());

        let remaining: i64 = sqlx::query_scalar("SELECT count(*) FROM events")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
