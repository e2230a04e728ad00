//! The event envelope and its typed payload variants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EventError;

/// Payload discriminators carried in [`Envelope::kind`].
pub mod event_kinds {
    pub const APPLICATION_UPDATED: &str = "application.updated";
    pub const NAMESERVER_RECORD_CREATED: &str = "nameserver.record_created";
    pub const NAMESERVER_RECORD_DELETED: &str = "nameserver.record_deleted";
}

/// The wire form of an event: subject, payload discriminator, opaque payload
/// and publication timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Hierarchical subject, e.g. `stellar.services.application.v1`.
    pub subject: String,

    /// Discriminator naming the payload variant.
    pub kind: String,

    /// The payload, opaque to the transport.
    pub payload: serde_json::Value,

    /// When the event was published.
    pub timestamp: DateTime<Utc>,
}

/// An application's deployed state changed (created, re-submitted or
/// deleted). Consumers re-read authoritative state; the event only names the
/// application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationUpdatedPayload {
    pub name: String,
}

/// A nameserver record was created or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameserverRecordPayload {
    pub name: String,
}

/// The typed event variants the core services exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ApplicationUpdated(ApplicationUpdatedPayload),
    NameserverRecordCreated(NameserverRecordPayload),
    NameserverRecordDeleted(NameserverRecordPayload),
}

impl Event {
    /// The discriminator for this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ApplicationUpdated(_) => event_kinds::APPLICATION_UPDATED,
            Event::NameserverRecordCreated(_) => event_kinds::NAMESERVER_RECORD_CREATED,
            Event::NameserverRecordDeleted(_) => event_kinds::NAMESERVER_RECORD_DELETED,
        }
    }
}

/// Wrap a typed event into an envelope on `subject`, stamped now.
pub fn marshal_event(subject: &str, event: &Event) -> Result<Envelope, EventError> {
    let payload = match event {
        Event::ApplicationUpdated(p) => serde_json::to_value(p)?,
        Event::NameserverRecordCreated(p) => serde_json::to_value(p)?,
        Event::NameserverRecordDeleted(p) => serde_json::to_value(p)?,
    };

    Ok(Envelope {
        subject: subject.to_string(),
        kind: event.kind().to_string(),
        payload,
        timestamp: Utc::now(),
    })
}

/// Recover the typed event from an envelope. Inverse of [`marshal_event`].
pub fn unmarshal_event(envelope: &Envelope) -> Result<Event, EventError> {
    match envelope.kind.as_str() {
        event_kinds::APPLICATION_UPDATED => Ok(Event::ApplicationUpdated(
            serde_json::from_value(envelope.payload.clone())?,
        )),
        event_kinds::NAMESERVER_RECORD_CREATED => Ok(Event::NameserverRecordCreated(
            serde_json::from_value(envelope.payload.clone())?,
        )),
        event_kinds::NAMESERVER_RECORD_DELETED => Ok(Event::NameserverRecordDeleted(
            serde_json::from_value(envelope.payload.clone())?,
        )),
        other => Err(EventError::UnknownEventKind(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subjects;

    #[test]
    fn test_marshal_unmarshal_inverse() {
        let event = Event::ApplicationUpdated(ApplicationUpdatedPayload {
            name: "guestbook".to_string(),
        });

        let envelope = marshal_event(subjects::APPLICATION, &event).unwrap();
        assert_eq!(envelope.subject, subjects::APPLICATION);
        assert_eq!(envelope.kind, event_kinds::APPLICATION_UPDATED);

        let back = unmarshal_event(&envelope).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_unmarshal_unknown_kind() {
        let envelope = Envelope {
            subject: subjects::APPLICATION.to_string(),
            kind: "application.exploded".to_string(),
            payload: serde_json::json!({}),
            timestamp: Utc::now(),
        };

        let err = unmarshal_event(&envelope).unwrap_err();
        assert!(matches!(err, EventError::UnknownEventKind(_)));
    }

    #[test]
    fn test_nameserver_events_roundtrip() {
        for event in [
            Event::NameserverRecordCreated(NameserverRecordPayload {
                name: "web.stellar".to_string(),
            }),
            Event::NameserverRecordDeleted(NameserverRecordPayload {
                name: "web.stellar".to_string(),
            }),
        ] {
            let envelope = marshal_event(subjects::NAMESERVER, &event).unwrap();
            assert_eq!(unmarshal_event(&envelope).unwrap(), event);
        }
    }
}
