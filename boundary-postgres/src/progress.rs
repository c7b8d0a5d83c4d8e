//! Progress tracking for the outbox and views processor
//! families, against their respective `outbox_topic_progress` and
//! `view_progress` tables.
use async_trait::async_trait;
use boundary_core::{
    OutboxProcessorKey, ProcessorStatus, ProgressDetails, ProgressTracker, ViewProcessorKey,
};
use sqlx::PgPool;

use crate::error::{is_undefined_table, Error};

fn status_to_sql(status: ProcessorStatus) -> &'static str {
    match status {
        ProcessorStatus::Active => "ACTIVE",
        ProcessorStatus::Paused => "PAUSED",
        ProcessorStatus::Failed => "FAILED",
    }
}

fn status_from_sql(status: &str) -> ProcessorStatus {
    match status {
        "PAUSED" => ProcessorStatus::Paused,
        "FAILED" => ProcessorStatus::Failed,
        _ => ProcessorStatus::Active,
    }
}

/// Tracks outbox dispatch progress, one row per `(topic, publisher)`.
pub struct PgOutboxProgressTracker {
    pool: PgPool,
}

impl PgOutboxProgressTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressTracker<OutboxProcessorKey> for PgOutboxProgressTracker {
    type Error = Error;

    async fn auto_register(
        &self,
        key: &OutboxProcessorKey,
        instance_id: &str,
    ) -> Result<(), Self::Error> {
        sqlx::query(
            "INSERT INTO outbox_topic_progress (topic, publisher, leader_instance) \
             VALUES ($1, $2, $3) ON CONFLICT (topic, publisher) DO NOTHING",
        )
        .bind(&key.topic)
        .bind(&key.publisher)
        .bind(instance_id)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_undefined_table(&err) {
                Error::SchemaNotInitialized("outbox_topic_progress")
            } else {
                Error::from(err)
            }
        })?;
        Ok(())
    }

    async fn get_last_position(&self, key: &OutboxProcessorKey) -> Result<i64, Self::Error> {
        let position: i64 = sqlx::query_scalar(
            "SELECT last_position FROM outbox_topic_progress WHERE topic = $1 AND publisher = $2",
        )
        .bind(&key.topic)
        .bind(&key.publisher)
        .fetch_one(&self.pool)
        .await?;
        Ok(position)
    }

    async fn update_progress(
        &self,
        key: &OutboxProcessorKey,
        position: i64,
    ) -> Result<(), Self::Error> {
        sqlx::query(
            "UPDATE outbox_topic_progress SET last_position = $3, updated_at = now() \
             WHERE topic = $1 AND publisher = $2",
        )
        .bind(&key.topic)
        .bind(&key.publisher)
        .bind(position)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_error(
        &self,
        key: &OutboxProcessorKey,
        message: &str,
        max_errors: u32,
    ) -> Result<(), Self::Error> {
        sqlx::query(
            "UPDATE outbox_topic_progress SET \
               error_count = error_count + 1, \
               last_error = $3, \
               last_error_at = now(), \
               status = CASE WHEN error_count + 1 >= $4 THEN 'FAILED' ELSE status END, \
               updated_at = now() \
             WHERE topic = $1 AND publisher = $2",
        )
        .bind(&key.topic)
        .bind(&key.publisher)
        .bind(message)
        .bind(max_errors as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_error_count(&self, key: &OutboxProcessorKey) -> Result<(), Self::Error> {
        sqlx::query(
            "UPDATE outbox_topic_progress SET error_count = 0, status = 'ACTIVE', updated_at = now() \
             WHERE topic = $1 AND publisher = $2",
        )
        .bind(&key.topic)
        .bind(&key.publisher)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_status(&self, key: &OutboxProcessorKey) -> Result<ProcessorStatus, Self::Error> {
        let status: String = sqlx::query_scalar(
            "SELECT status FROM outbox_topic_progress WHERE topic = $1 AND publisher = $2",
        )
        .bind(&key.topic)
        .bind(&key.publisher)
        .fetch_one(&self.pool)
        .await?;
        Ok(status_from_sql(&status))
    }

    async fn set_status(
        &self,
        key: &OutboxProcessorKey,
        status: ProcessorStatus,
    ) -> Result<(), Self::Error> {
        sqlx::query(
            "UPDATE outbox_topic_progress SET status = $3, updated_at = now() \
             WHERE topic = $1 AND publisher = $2",
        )
        .bind(&key.topic)
        .bind(&key.publisher)
        .bind(status_to_sql(status))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_progress_details(
        &self,
        key: &OutboxProcessorKey,
    ) -> Result<ProgressDetails, Self::Error> {
        let row: (i64, String, i32, Option<String>, Option<String>) = sqlx::query_as(
            "SELECT last_position, status, error_count, last_error, leader_instance \
             FROM outbox_topic_progress WHERE topic = $1 AND publisher = $2",
        )
        .bind(&key.topic)
        .bind(&key.publisher)
        .fetch_one(&self.pool)
        .await?;
        Ok(ProgressDetails {
            last_position: row.0,
            status: status_from_sql(&row.1),
            error_count: row.2 as u32,
            last_error: row.3,
            leader_instance: row.4,
        })
    }

    async fn heartbeat(
        &self,
        key: &OutboxProcessorKey,
        instance_id: &str,
    ) -> Result<(), Self::Error> {
        sqlx::query(
            "UPDATE outbox_topic_progress SET leader_instance = $3, leader_heartbeat = now() \
             WHERE topic = $1 AND publisher = $2",
        )
        .bind(&key.topic)
        .bind(&key.publisher)
        .bind(instance_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Tracks view dispatch progress, one row per view name.
pub struct PgViewProgressTracker {
    pool: PgPool,
}

impl PgViewProgressTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressTracker<ViewProcessorKey> for PgViewProgressTracker {
    type Error = Error;

    async fn auto_register(
        &self,
        key: &ViewProcessorKey,
        instance_id: &str,
    ) -> Result<(), Self::Error> {
        sqlx::query(
            "INSERT INTO view_progress (view_name, instance_id) VALUES ($1, $2) \
             ON CONFLICT (view_name) DO NOTHING",
        )
        .bind(&key.view_name)
        .bind(instance_id)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_undefined_table(&err) {
                Error::SchemaNotInitialized("view_progress")
            } else {
                Error::from(err)
            }
        })?;
        Ok(())
    }

    async fn get_last_position(&self, key: &ViewProcessorKey) -> Result<i64, Self::Error> {
        let position: i64 =
            sqlx::query_scalar("SELECT last_position FROM view_progress WHERE view_name = $1")
                .bind(&key.view_name)
                .fetch_one(&self.pool)
                .await?;
        Ok(position)
    }

    async fn update_progress(
        &self,
        key: &ViewProcessorKey,
        position: i64,
    ) -> Result<(), Self::Error> {
        sqlx::query(
            "UPDATE view_progress SET last_position = $2, last_updated_at = now() \
             WHERE view_name = $1",
        )
        .bind(&key.view_name)
        .bind(position)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_error(
        &self,
        key: &ViewProcessorKey,
        message: &str,
        max_errors: u32,
    ) -> Result<(), Self::Error> {
        sqlx::query(
            "UPDATE view_progress SET \
               error_count = error_count + 1, \
               last_error = $2, \
               last_error_at = now(), \
               status = CASE WHEN error_count + 1 >= $3 THEN 'FAILED' ELSE status END, \
               last_updated_at = now() \
             WHERE view_name = $1",
        )
        .bind(&key.view_name)
        .bind(message)
        .bind(max_errors as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_error_count(&self, key: &ViewProcessorKey) -> Result<(), Self::Error> {
        sqlx::query(
            "UPDATE view_progress SET error_count = 0, status = 'ACTIVE', last_updated_at = now() \
             WHERE view_name = $1",
        )
        .bind(&key.view_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_status(&self, key: &ViewProcessorKey) -> Result<ProcessorStatus, Self::Error> {
        let status: String =
            sqlx::query_scalar("SELECT status FROM view_progress WHERE view_name = $1")
                .bind(&key.view_name)
                .fetch_one(&self.pool)
                .await?;
        Ok(status_from_sql(&status))
    }

    async fn set_status(
        &self,
        key: &ViewProcessorKey,
        status: ProcessorStatus,
    ) -> Result<(), Self::Error> {
        sqlx::query("UPDATE view_progress SET status = $2, last_updated_at = now() WHERE view_name = $1")
            .bind(&key.view_name)
            .bind(status_to_sql(status))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_progress_details(
        &self,
        key: &ViewProcessorKey,
    ) -> Result<ProgressDetails, Self::Error> {
        let row: (i64, String, i32, Option<String>, Option<String>) = sqlx::query_as(
            "SELECT last_position, status, error_count, last_error, instance_id \
             FROM view_progress WHERE view_name = $1",
        )
        .bind(&key.view_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(ProgressDetails {
            last_position: row.0,
            status: status_from_sql(&row.1),
            error_count: row.2 as u32,
            last_error: row.3,
            leader_instance: row.4,
        })
    }

    async fn heartbeat(&self, key: &ViewProcessorKey, instance_id: &str) -> Result<(), Self::Error> {
        sqlx::query(
            "UPDATE view_progress SET instance_id = $2, leader_heartbeat = now() \
             WHERE view_name = $1",
        )
        .bind(&key.view_name)
        .bind(instance_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_sql_text() {
        for status in [
            ProcessorStatus::Active,
            ProcessorStatus::Paused,
            ProcessorStatus::Failed,
        ] {
            assert_eq!(status_from_sql(status_to_sql(status)), status);
        }
    }

    #[test]
    fn unknown_status_text_defaults_to_active() {
        assert_eq!(status_from_sql("whatever"), ProcessorStatus::Active);
    }

    #[sqlx::test]
    async fn outbox_tracker_registers_tracks_and_reports_errors(pool: sqlx::PgPool) {
        crate::migrator::Migrator::new(&pool).init_outbox().await.unwrap();
        let tracker = PgOutboxProgressTracker::new(pool);
        let key = OutboxProcessorKey {
            topic: "payments".to_string(),
            publisher: "webhook-a".to_string(),
        };

        tracker.auto_register(&key, "instance-1").await.unwrap();
        tracker.auto_register(&key, "instance-1").await.unwrap(); // idempotent
        assert_eq!(tracker.get_last_position(&key).await.unwrap(), 0);

        tracker.update_progress(&key, 42).await.unwrap();
        assert_eq!(tracker.get_last_position(&key).await.unwrap(), 42);

        tracker.record_error(&key, "boom", 3).await.unwrap();
        let details = tracker.get_progress_details(&key).await.unwrap();
        assert_eq!(details.error_count, 1);
        assert_eq!(details.status, ProcessorStatus::Active);
        assert_eq!(details.last_error.as_deref(), Some("boom"));

        tracker.record_error(&key, "boom again", 2).await.unwrap();
        assert_eq!(tracker.get_status(&key).await.unwrap(), ProcessorStatus::Failed);

        tracker.reset_error_count(&key).await.unwrap();
        assert_eq!(tracker.get_status(&key).await.unwrap(), ProcessorStatus::Active);
    }

    #[sqlx::test]
    async fn view_tracker_registers_tracks_and_reports_errors(pool: sqlx::PgPool) {
        crate::migrator::Migrator::new(&pool).init_views().await.unwrap();
        let tracker = PgViewProgressTracker::new(pool);
        let key = ViewProcessorKey {
            view_name: "account_balances".to_string(),
        };

        tracker.auto_register(&key, "instance-1").await.unwrap();
        tracker.update_progress(&key, 7).await.unwrap();
        assert_eq!(tracker.get_last_position(&key).await.unwrap(), 7);

        tracker.set_status(&key, ProcessorStatus::Paused).await.unwrap();
        assert_eq!(tracker.get_status(&key).await.unwrap(), ProcessorStatus::Paused);

        tracker.heartbeat(&key, "instance-2").await.unwrap();
        let details = tracker.get_progress_details(&key).await.unwrap();
        assert_eq!(details.leader_instance.as_deref(), Some("instance-2"));
    }

    #[sqlx::test]
    async fn missing_schema_is_reported_as_schema_not_initialized(pool: sqlx::PgPool) {
        let tracker = PgOutboxProgressTracker::new(pool);
        let key = OutboxProcessorKey {
            topic: "payments".to_string(),
            publisher: "webhook-a".to_string(),
        };
        let result = tracker.auto_register(&key, "instance-1").await;
        assert!(matches!(result, Err(Error::SchemaNotInitialized(_))));
    }
}
