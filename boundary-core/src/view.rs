//! The view adapter (C10): projects events into user-defined, asynchronous
//! read models via idempotent upserts.
use async_trait::async_trait;

use crate::event::PersistedEvent;

/// Identifies one view processor. This is the `K` the generic processor
/// runtime, progress tracker, and event fetcher are instantiated with for
/// the views family.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewProcessorKey {
    pub view_name: String,
}

impl ViewProcessorKey {
    pub fn new(view_name: impl Into<String>) -> Self {
        Self {
            view_name: view_name.into(),
        }
    }
}

impl std::fmt::Display for ViewProcessorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.view_name)
    }
}

/// Which events a view subscribes to: by event type and by tag-key
/// presence (not value - the fetcher filters by key presence only).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewSubscription {
    pub view_name: String,
    pub event_types: Vec<String>,
    pub required_tags: Vec<String>,
    pub any_of_tags: Vec<String>,
}

/// Projects a batch of events into a read model. The core invokes `handle`
/// inside a transaction and advances the view's recorded position only if
/// it returns successfully; a projector must tolerate the same batch being
/// re-applied (at-least-once dispatch).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ViewProjector: Send + Sync {
    fn view_name(&self) -> &str;

    /// Applies `batch` to the read model. The core provides no access to
    /// the underlying write connection through this trait; backend
    /// implementations that need transactional access to the same
    /// connection the position update commits on (e.g. the Postgres
    /// backend) extend this contract with a connection-aware variant.
    async fn handle(&self, batch: &[PersistedEvent]) -> Result<(), crate::command::DynError>;
}
