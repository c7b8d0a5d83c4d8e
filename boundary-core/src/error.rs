//! Error taxonomy shared by the store, command executor, and processor
//! runtime. Every public error carries its cause through `#[source]` so
//! a `tracing` span attached at the call site shows the full chain.
use thiserror::Error;

/// Errors an [`crate::event_store::EventStore`] implementation can raise.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `append_if`'s `state_changed` query matched an event beyond the
    /// caller's observed cursor: the caller decided on stale state.
    #[error("concurrent state change detected")]
    Concurrency,
    /// `append_if`'s `already_exists` query matched an existing event: the
    /// operation has already been recorded.
    #[error("operation already recorded")]
    Idempotency,
    /// Invalid arguments supplied to a store operation.
    #[error("validation error: {0}")]
    Validation(String),
    /// Any failure originating below the store's own logic: connection
    /// loss, a constraint violation unrelated to DCB, serialization, etc.
    #[error("infrastructure error")]
    Infrastructure(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn infrastructure(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Infrastructure(Box::new(source))
    }

    pub fn is_concurrency(&self) -> bool {
        matches!(self, StoreError::Concurrency)
    }

    pub fn is_idempotency(&self) -> bool {
        matches!(self, StoreError::Idempotency)
    }
}

/// Errors the command executor can raise, parameterized by the handler's
/// own domain error type.
#[derive(Debug, Error)]
pub enum CommandError<E> {
    /// The handler rejected the command; no events were stored.
    #[error("domain error")]
    Domain(#[source] E),
    /// The append's `state_changed` guard failed; the caller should retry
    /// after re-reading state. Never surfaced for idempotency failures -
    /// those are folded into a successful, idempotent execution result.
    #[error("concurrent state change detected")]
    Concurrency,
    /// No handler registered for the command's type.
    #[error("no handler registered for command type: {0}")]
    UnknownCommandType(String),
    /// Invalid command.
    #[error("validation error: {0}")]
    Validation(String),
    /// A failure below the command pipeline's own logic.
    #[error("infrastructure error")]
    Infrastructure(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl<E> From<StoreError> for CommandError<E> {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Concurrency => CommandError::Concurrency,
            StoreError::Idempotency => {
                unreachable!("idempotency failures must be intercepted before this conversion")
            }
            StoreError::Validation(msg) => CommandError::Validation(msg),
            StoreError::Infrastructure(source) => CommandError::Infrastructure(source),
        }
    }
}

/// Errors surfaced by the generic processor runtime (outbox or views).
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The handler (publisher or view projector) failed while processing a
    /// batch; the batch's transaction was rolled back and `last_position`
    /// did not advance.
    #[error("processor handler failed")]
    HandlerFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The processor's progress row has `status = FAILED` (its error
    /// counter reached the configured maximum); it will not be scheduled
    /// again until explicitly reset.
    #[error("processor is in the failed state and requires a manual reset")]
    ProcessorFailed,
    /// The processor's progress table does not exist yet - the schema
    /// migration has not been run.
    #[error("processor progress schema is not initialized")]
    SchemaNotInitialized,
    /// A failure below the runtime's own logic.
    #[error("infrastructure error")]
    Infrastructure(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ProcessorError {
    pub fn infrastructure(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Infrastructure(Box::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_classifies_concurrency_and_idempotency() {
        assert!(StoreError::Concurrency.is_concurrency());
        assert!(StoreError::Idempotency.is_idempotency());
        assert!(!StoreError::Concurrency.is_idempotency());
    }

    #[test]
    fn command_error_maps_store_concurrency() {
        let err: CommandError<&'static str> = StoreError::Concurrency.into();
        assert!(matches!(err, CommandError::Concurrency));
    }
}
