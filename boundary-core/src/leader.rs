//! Single-leader election (C5). Exactly one running instance per
//! leadership domain (outbox, views) is allowed to drive dispatch.
use async_trait::async_trait;

/// A leadership domain's current state, as observed by one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderState {
    Leader,
    Follower,
}

/// A leadership transition an elector reports through a
/// [`LeaderEventSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderEvent<'a> {
    BecameLeader { instance_id: &'a str },
    LostLeadership { instance_id: &'a str },
}

/// Observes leadership transitions. Implementations must not fail or
/// block meaningfully; this is a reporting seam, not a veto point.
pub trait LeaderEventSink: Send + Sync {
    fn emit(&self, event: LeaderEvent<'_>);
}

/// A sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLeaderEventSink;

impl LeaderEventSink for NoopLeaderEventSink {
    fn emit(&self, _event: LeaderEvent<'_>) {}
}

/// A sink that logs each transition as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLeaderEventSink;

impl LeaderEventSink for TracingLeaderEventSink {
    fn emit(&self, event: LeaderEvent<'_>) {
        match event {
            LeaderEvent::BecameLeader { instance_id } => {
                tracing::info!(instance_id, "became leader");
            }
            LeaderEvent::LostLeadership { instance_id } => {
                tracing::warn!(instance_id, "lost leadership");
            }
        }
    }
}

/// Elects a single leader for a leadership domain via a backend-specific
/// mutual-exclusion primitive (a PostgreSQL advisory lock, for this
/// crate's backend).
#[cfg_attr(test, mockall::automock(type Error = crate::error::ProcessorError;))]
#[async_trait]
pub trait LeaderElector: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Attempts to become leader without blocking. Returns `true` if this
    /// call won leadership or this instance already holds it.
    async fn try_acquire(&self) -> Result<bool, Self::Error>;

    /// Gives up leadership, if held.
    async fn release(&self) -> Result<(), Self::Error>;

    /// Returns the last known leadership state without performing I/O.
    fn is_leader(&self) -> bool;

    /// A stable identifier for this process, used in progress rows and
    /// logs to attribute which instance last acted as leader.
    fn instance_id(&self) -> &str;
}
