//! The event broker seam and its in-process implementation.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{subject_matches, Envelope, EventError};

/// The cluster event bus.
///
/// Subscriptions are lazy and non-restartable: a subscriber sees events
/// published after it subscribed, and a subscriber that loses its stream
/// re-subscribes from "now" with no replay.
#[async_trait]
pub trait EventBroker: Send + Sync {
    /// Publish an envelope to its subject.
    async fn publish(&self, envelope: Envelope) -> Result<(), EventError>;

    /// Subscribe to every subject matching `pattern`.
    async fn subscribe(&self, pattern: &str) -> Result<Subscription, EventError>;
}

/// A live subscription. Dropped subscriptions release their slot.
pub struct Subscription {
    pattern: String,
    rx: broadcast::Receiver<Envelope>,
    skipped: u64,
}

impl Subscription {
    /// The next matching envelope, or `None` once the broker shuts down.
    ///
    /// A subscriber that falls behind the channel capacity observes a gap:
    /// the missed events are counted, not replayed.
    pub async fn next(&mut self) -> Option<Envelope> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => {
                    if subject_matches(&self.pattern, &envelope.subject) {
                        return Some(envelope);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.skipped += n;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Events dropped because this subscriber lagged.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

/// In-process [`EventBroker`] over a tokio broadcast channel.
///
/// Suitable for single-node wiring and tests; a clustered deployment swaps
/// this for a bus-backed implementation.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    tx: broadcast::Sender<Envelope>,
}

impl MemoryBroker {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventBroker for MemoryBroker {
    async fn publish(&self, envelope: Envelope) -> Result<(), EventError> {
        if envelope.subject.contains('>') {
            return Err(EventError::InvalidSubject(envelope.subject));
        }

        // No subscribers is fine; events without an audience are dropped.
        let _ = self.tx.send(envelope);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, EventError> {
        if pattern.is_empty() {
            return Err(EventError::InvalidSubject(pattern.to_string()));
        }

        Ok(Subscription {
            pattern: pattern.to_string(),
            rx: self.tx.subscribe(),
            skipped: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{marshal_event, subjects, ApplicationUpdatedPayload, Event};

    fn update_event(name: &str) -> Envelope {
        marshal_event(
            subjects::APPLICATION,
            &Event::ApplicationUpdated(ApplicationUpdatedPayload {
                name: name.to_string(),
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_receives_matching_events() {
        let broker = MemoryBroker::default();
        let mut sub = broker.subscribe("stellar.services.>").await.unwrap();

        broker.publish(update_event("guestbook")).await.unwrap();

        let envelope = sub.next().await.unwrap();
        assert_eq!(envelope.subject, subjects::APPLICATION);
    }

    #[tokio::test]
    async fn test_subscribe_filters_by_pattern() {
        let broker = MemoryBroker::default();
        let mut sub = broker
            .subscribe("stellar.services.nameserver.v1")
            .await
            .unwrap();

        broker.publish(update_event("guestbook")).await.unwrap();

        let mut other = Envelope {
            subject: subjects::NAMESERVER.to_string(),
            ..update_event("guestbook")
        };
        other.kind = "nameserver.record_created".to_string();
        broker.publish(other).await.unwrap();

        let envelope = sub.next().await.unwrap();
        assert_eq!(envelope.subject, subjects::NAMESERVER);
    }

    #[tokio::test]
    async fn test_publish_rejects_wildcard_subject() {
        let broker = MemoryBroker::default();
        let mut envelope = update_event("guestbook");
        envelope.subject = "stellar.services.>".to_string();

        let err = broker.publish(envelope).await.unwrap_err();
        assert!(matches!(err, EventError::InvalidSubject(_)));
    }

    #[tokio::test]
    async fn test_no_replay_for_late_subscribers() {
        let broker = MemoryBroker::default();
        broker.publish(update_event("early")).await.unwrap();

        let mut sub = broker.subscribe("stellar.services.>").await.unwrap();
        broker.publish(update_event("late")).await.unwrap();

        let envelope = sub.next().await.unwrap();
        let name = envelope.payload["name"].as_str().unwrap();
        assert_eq!(name, "late");
    }
}
