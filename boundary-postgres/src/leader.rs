//! Single-leader election via a PostgreSQL session-scoped advisory
//! lock, held on a dedicated connection for the life of the leadership
//! term: `pg_try_advisory_lock`/`pg_advisory_unlock` are scoped to the
//! session that acquired them, so this elector cannot share the pool.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use boundary_core::{LeaderElector, LeaderEvent, LeaderEventSink, NoopLeaderEventSink};
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Elects a single leader for one leadership domain (e.g. "outbox",
/// "views") identified by `lock_key`, a stable advisory-lock id the host
/// application assigns per domain.
pub struct PgLeaderElector {
    conn: Mutex<PgConnection>,
    lock_key: i64,
    instance_id: String,
    is_leader: Arc<AtomicBool>,
    sink: Arc<dyn LeaderEventSink>,
}

impl PgLeaderElector {
    /// Opens a dedicated connection from `options` for this elector to
    /// hold its advisory lock on.
    pub async fn connect(
        options: PgConnectOptions,
        lock_key: i64,
        instance_id: impl Into<String>,
    ) -> Result<Self, Error> {
        let conn = PgConnection::connect_with(&options).await?;
        Ok(Self::new(conn, lock_key, instance_id))
    }

    pub fn new(conn: PgConnection, lock_key: i64, instance_id: impl Into<String>) -> Self {
        Self {
            conn: Mutex::new(conn),
            lock_key,
            instance_id: instance_id.into(),
            is_leader: Arc::new(AtomicBool::new(false)),
            sink: Arc::new(NoopLeaderEventSink),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn LeaderEventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Calls [`LeaderElector::try_acquire`] repeatedly at `retry_interval`
    /// until it wins leadership or `cancellation` fires: on startup, every
    /// instance retries acquisition until it wins or is externally stopped.
    pub async fn acquire_with_retry(
        &self,
        retry_interval: Duration,
        cancellation: &CancellationToken,
    ) -> bool {
        loop {
            match self.try_acquire().await {
                Ok(true) => return true,
                Ok(false) | Err(_) => {}
            }
            tokio::select! {
                _ = tokio::time::sleep(retry_interval) => {}
                _ = cancellation.cancelled() => return false,
            }
        }
    }
}

#[async_trait]
impl LeaderElector for PgLeaderElector {
    type Error = Error;

    async fn try_acquire(&self) -> Result<bool, Self::Error> {
        if self.is_leader.load(Ordering::SeqCst) {
            return Ok(true);
        }
        let mut conn = self.conn.lock().await;
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(self.lock_key)
            .fetch_one(&mut *conn)
            .await?;
        if acquired {
            self.is_leader.store(true, Ordering::SeqCst);
            self.sink.emit(LeaderEvent::BecameLeader {
                instance_id: &self.instance_id,
            });
        }
        Ok(acquired)
    }

    async fn release(&self) -> Result<(), Self::Error> {
        if !self.is_leader.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(self.lock_key)
            .execute(&mut *conn)
            .await?;
        self.is_leader.store(false, Ordering::SeqCst);
        self.sink.emit(LeaderEvent::LostLeadership {
            instance_id: &self.instance_id,
        });
        Ok(())
    }

    fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }
}
