//! Event types. Unlike a compile-time event schema keyed by a static
//! `Event` trait and an `EventId` type parameter, the payload here is opaque
//! bytes from the store's perspective; typed access is recovered at the
//! edges by a [`crate::projector::Projector`] using a codec.
use crate::cursor::Cursor;
use crate::tag::TagSet;

/// An event the caller wants to append: type, tags, and a serialized
/// payload. Does not yet carry a position - that is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    event_type: String,
    tags: TagSet,
    payload: Vec<u8>,
}

impl NewEvent {
    pub fn new(event_type: impl Into<String>, tags: TagSet, payload: Vec<u8>) -> Self {
        Self {
            event_type: event_type.into(),
            tags,
            payload,
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_parts(self) -> (String, TagSet, Vec<u8>) {
        (self.event_type, self.tags, self.payload)
    }
}

/// An event as read back from the store: a [`NewEvent`] plus the position,
/// transaction id, and occurred-at timestamp the store assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEvent {
    event: NewEvent,
    position: i64,
    transaction_id: i64,
    occurred_at: i64,
}

impl PersistedEvent {
    pub fn new(event: NewEvent, position: i64, transaction_id: i64, occurred_at: i64) -> Self {
        Self {
            event,
            position,
            transaction_id,
            occurred_at,
        }
    }

    pub fn event_type(&self) -> &str {
        self.event.event_type()
    }

    pub fn tags(&self) -> &TagSet {
        self.event.tags()
    }

    pub fn payload(&self) -> &[u8] {
        self.event.payload()
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn transaction_id(&self) -> i64 {
        self.transaction_id
    }

    pub fn occurred_at(&self) -> i64 {
        self.occurred_at
    }

    /// The cursor a reader should record after observing this event.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.position, self.occurred_at, self.transaction_id)
    }

    pub fn into_new_event(self) -> NewEvent {
        self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::tags;

    #[test]
    fn persisted_event_cursor_reflects_its_own_position() {
        let event = NewEvent::new("AccountOpened", tags([("account_id", "acc-1".into())]), vec![]);
        let persisted = PersistedEvent::new(event, 5, 100, 42);
        assert_eq!(persisted.cursor(), Cursor::new(5, 42, 100));
    }
}
