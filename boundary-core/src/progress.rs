//! Per-processor progress tracking (C6), generic over the processor key
//! type `K` so the same contract serves both the outbox family (keyed by
//! `(topic, publisher)`) and the views family (keyed by view name).
use async_trait::async_trait;

/// The lifecycle state of one processor's progress row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorStatus {
    Active,
    Paused,
    Failed,
}

/// A snapshot of a processor's progress row, as returned by
/// `get_progress_details`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressDetails {
    pub last_position: i64,
    pub status: ProcessorStatus,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub leader_instance: Option<String>,
}

/// Tracks the dispatch position and health of processors keyed by `K`.
#[async_trait]
pub trait ProgressTracker<K>: Send + Sync
where
    K: Send + Sync,
{
    type Error: std::error::Error + Send + Sync + 'static;

    /// Inserts a fresh, `ACTIVE`, zero-position row for `key` if one does
    /// not already exist. Idempotent.
    async fn auto_register(&self, key: &K, instance_id: &str) -> Result<(), Self::Error>;

    async fn get_last_position(&self, key: &K) -> Result<i64, Self::Error>;

    /// Advances `key`'s recorded position. Callers are responsible for
    /// invoking this in the same transaction as the batch's side effects
    /// so progress can only advance when those effects committed.
    async fn update_progress(&self, key: &K, position: i64) -> Result<(), Self::Error>;

    /// Records a handler failure for `key`. Transitions the row to
    /// `FAILED` once `error_count` reaches `max_errors`.
    async fn record_error(
        &self,
        key: &K,
        message: &str,
        max_errors: u32,
    ) -> Result<(), Self::Error>;

    /// Clears the error counter and restores `status` to `ACTIVE`.
    async fn reset_error_count(&self, key: &K) -> Result<(), Self::Error>;

    async fn get_status(&self, key: &K) -> Result<ProcessorStatus, Self::Error>;

    async fn set_status(&self, key: &K, status: ProcessorStatus) -> Result<(), Self::Error>;

    async fn get_progress_details(&self, key: &K) -> Result<ProgressDetails, Self::Error>;

    /// Records this instance as actively working `key`, refreshing its
    /// leader heartbeat.
    async fn heartbeat(&self, key: &K, instance_id: &str) -> Result<(), Self::Error>;
}
