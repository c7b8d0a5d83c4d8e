//! The contract an append must satisfy for the Dynamic Consistency Boundary
//! to hold: no state-changing event the caller hasn't seen, and no repeat of
//! an operation already recorded.
use crate::cursor::Cursor;
use crate::query::Query;

/// Guards an `append_if` call.
///
/// `after` is the cursor the caller last observed; `state_changed`, when
/// present, is the query whose matches beyond `after` indicate the caller's
/// decision was made on stale state - `None` means no concurrency check is
/// performed at all. `already_exists`, when present, additionally guards the
/// append against being a duplicate of an already-recorded operation,
/// regardless of `after`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendCondition {
    after: Cursor,
    state_changed: Option<Query>,
    already_exists: Option<Query>,
}

impl AppendCondition {
    pub fn new(after: Cursor, state_changed: Query) -> Self {
        Self {
            after,
            state_changed: Some(state_changed),
            already_exists: None,
        }
    }

    /// The condition is satisfied only if the stream is currently empty:
    /// `after = zero` and `state_changed` matches every event.
    pub fn expect_empty_stream() -> Self {
        Self::new(Cursor::ZERO, Query::all())
    }

    /// A pure idempotency guard: no state-changed check, only a duplicate
    /// check against `already_exists`.
    pub fn idempotent_on(already_exists: Query) -> Self {
        Self {
            after: Cursor::ZERO,
            state_changed: None,
            already_exists: Some(already_exists),
        }
    }

    pub fn with_idempotency(mut self, already_exists: Query) -> Self {
        self.already_exists = Some(already_exists);
        self
    }

    pub fn after(&self) -> Cursor {
        self.after
    }

    pub fn state_changed(&self) -> Option<&Query> {
        self.state_changed.as_ref()
    }

    pub fn already_exists(&self) -> Option<&Query> {
        self.already_exists.as_ref()
    }
}
