//! The projection engine (C3): folds a queried event stream into a typed
//! state plus the cursor at which that state holds.
//!
//! Unlike the compile-time `StateQuery`/`MultiState` machinery built around
//! a static event enum, projection here is backend-agnostic: it operates
//! purely against the [`EventStore::query`] stream and a caller-supplied
//! deserializer, so it needs no Postgres-specific code at all.
use futures::StreamExt;

use crate::cursor::Cursor;
use crate::event_store::EventStore;
use crate::query::Query;

/// A typed projection: an initial state and a fold step invoked once per
/// matching, deserialized event.
pub trait Projection: Send {
    /// The typed domain event this projection folds.
    type Event;

    fn initial_state() -> Self;

    fn apply(&mut self, event: Self::Event);
}

/// Deserializes a raw event payload into a typed domain event. Kept
/// separate from `boundary-codec`'s `Deserializer` trait so projections
/// don't need to depend on that crate directly; any codec can provide an
/// adapter.
pub trait EventDecoder<E>: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn decode(&self, event_type: &str, payload: &[u8]) -> Result<E, Self::Error>;
}

/// The result of a projection: the folded state and the cursor of the
/// last event observed (or the `after` cursor passed in, if none matched).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projected<S> {
    pub state: S,
    pub cursor: Cursor,
}

/// Errors `project` can surface: either the store failed, or an event
/// matching the query could not be decoded into the projection's event
/// type.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError<SE, DE> {
    #[error("event store error")]
    Store(#[source] SE),
    #[error("failed to decode event payload")]
    Decode(#[source] DE),
}

/// Streams `query` from `store`, strictly after `after`, folding every
/// matching event into `P` via `decoder`.
pub async fn project<ES, P, D>(
    store: &ES,
    query: &Query,
    after: Cursor,
    decoder: &D,
) -> Result<Projected<P>, ProjectError<ES::Error, D::Error>>
where
    ES: EventStore,
    P: Projection,
    D: EventDecoder<P::Event>,
{
    let mut state = P::initial_state();
    let mut cursor = after;
    let mut stream = store.query(query, after);
    while let Some(item) = stream.next().await {
        let event = item.map_err(ProjectError::Store)?;
        let decoded = decoder
            .decode(event.event_type(), event.payload())
            .map_err(ProjectError::Decode)?;
        cursor = event.cursor();
        state.apply(decoded);
    }
    Ok(Projected { state, cursor })
}
