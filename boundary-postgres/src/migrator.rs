//! Schema initialization for the Postgres backend.
//!
//! Creates the `events`, `commands`, `outbox_topic_progress`, and
//! `view_progress` tables plus their indexes. Intended to run once at
//! application startup, or from dedicated administrative tooling; every
//! statement is `IF NOT EXISTS` so running it repeatedly is harmless.
use sqlx::PgPool;

use crate::error::Error;

/// Initializes the database schema this crate's stores, trackers, and
/// fetchers expect to find.
pub struct Migrator<'a> {
    pool: &'a PgPool,
}

impl<'a> Migrator<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `events` table and its indexes.
    pub async fn init_event_store(&self) -> Result<(), Error> {
        sqlx::raw_sql(include_str!("sql/table_events.sql"))
            .execute(self.pool)
            .await?;
        sqlx::raw_sql(include_str!("sql/idx_events.sql"))
            .execute(self.pool)
            .await?;
        sqlx::raw_sql(include_str!("sql/table_commands.sql"))
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Creates the `outbox_topic_progress` table.
    pub async fn init_outbox(&self) -> Result<(), Error> {
        sqlx::raw_sql(include_str!("sql/table_outbox_topic_progress.sql"))
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Creates the `view_progress` table.
    pub async fn init_views(&self) -> Result<(), Error> {
        sqlx::raw_sql(include_str!("sql/table_view_progress.sql"))
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Runs every migration: event store, outbox, and views.
    pub async fn init_all(&self) -> Result<(), Error> {
        self.init_event_store().await?;
        self.init_outbox().await?;
        self.init_views().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;

    #[sqlx::test]
    async fn init_all_is_idempotent(pool: PgPool) {
        let migrator = Migrator::new(&pool);
        migrator.init_all().await.unwrap();
        migrator.init_all().await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'public' ORDER BY table_name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for expected in [
            "commands",
            "events",
            "outbox_topic_progress",
            "view_progress",
        ] {
            assert!(
                tables.iter().any(|t| t == expected),
                "expected table {expected} to exist, found {tables:?}"
            );
        }
    }
}
