use thiserror::Error;

/// Errors surfaced by the PostgreSQL backend before they are classified into
/// `boundary_core::StoreError`/`CommandError`/`ProcessorError`.
#[derive(Error, Debug)]
pub enum Error {
    /// Error returned from the database.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    /// The append condition's state-changed query matched a committed,
    /// visible event past the given cursor.
    #[error("concurrent modification error")]
    Concurrency,
    /// The append condition's already-exists query matched a committed
    /// event.
    #[error("idempotency error: effect already applied")]
    Idempotency,
    /// A progress table (`outbox_topic_progress`, `view_progress`) has not
    /// been created yet; the migrator has not run.
    #[error("schema not initialized: {0}")]
    SchemaNotInitialized(&'static str),
    /// A command handler, view projector, or outbox publisher failed.
    #[error("handler failed: {0}")]
    HandlerFailed(#[source] boundary_core::DynError),
}

/// Postgres error code for "undefined table".
pub(crate) const UNDEFINED_TABLE: &str = "42P01";

pub(crate) fn is_undefined_table(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(description) if description.code().as_deref() == Some(UNDEFINED_TABLE))
}
