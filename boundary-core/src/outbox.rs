//! The outbox adapter (C9): routes newly appended events to external
//! publishers, one dispatch pipeline per `(topic, publisher)` pair.
use async_trait::async_trait;

use crate::event::PersistedEvent;

/// Identifies one outbox processor: a topic routed to one of its
/// publishers. This is the `K` the generic processor runtime, progress
/// tracker, and event fetcher are instantiated with for the outbox family.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutboxProcessorKey {
    pub topic: String,
    pub publisher: String,
}

impl OutboxProcessorKey {
    pub fn new(topic: impl Into<String>, publisher: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            publisher: publisher.into(),
        }
    }
}

impl std::fmt::Display for OutboxProcessorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}", self.topic, self.publisher)
    }
}

/// Whether a publisher wants a whole batch at once or one event at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishMode {
    #[default]
    Batch,
    Individual,
}

/// An external sink events are routed to. Implementations must be
/// idempotent with respect to an event's position, since dispatch is
/// at-least-once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutboxPublisher: Send + Sync {
    fn name(&self) -> &str;

    fn preferred_mode(&self) -> PublishMode {
        PublishMode::Batch
    }

    async fn publish_batch(&self, events: &[PersistedEvent]) -> Result<(), crate::command::DynError>;

    /// Consulted before a dispatch cycle starts; an unhealthy publisher
    /// causes the cycle to be skipped rather than failed.
    async fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_formats_as_topic_slash_publisher() {
        let key = OutboxProcessorKey::new("payments", "webhook-a");
        assert_eq!(key.to_string(), "payments/webhook-a");
    }

    #[test]
    fn default_publish_mode_is_batch() {
        assert_eq!(PublishMode::default(), PublishMode::Batch);
    }

    #[tokio::test]
    async fn a_mocked_publisher_receives_the_dispatched_batch() {
        let mut publisher = MockOutboxPublisher::new();
        publisher.expect_name().return_const("webhook-a".to_string());
        publisher
            .expect_publish_batch()
            .times(1)
            .withf(|events: &[PersistedEvent]| events.len() == 2)
            .returning(|_| Ok(()));

        let event = PersistedEvent::new(
            crate::event::NewEvent::new("AccountOpened", Default::default(), b"{}".to_vec()),
            1,
            1,
            0,
        );
        publisher
            .publish_batch(&[event.clone(), event])
            .await
            .unwrap();
        assert_eq!(publisher.name(), "webhook-a");
    }
}
