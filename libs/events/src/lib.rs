//! # stellar-events
//!
//! Event type definitions and pub/sub plumbing for the stellar cluster.
//!
//! Every event travels as an [`Envelope`]: a hierarchical subject, a string
//! discriminator naming the payload variant, the opaque payload itself, and a
//! timestamp. [`marshal_event`] and [`unmarshal_event`] convert between
//! envelopes and the typed [`Event`] variants.
//!
//! Subjects are dot-separated (`stellar.services.application.v1`); a
//! subscription pattern may end in `>` to match everything below a prefix.
//!
//! The [`EventBroker`] trait is the seam to the cluster's event bus.
//! [`MemoryBroker`] is the in-process reference implementation; subscriber
//! streams are lazy and non-restartable, and a subscriber that falls behind
//! skips ahead to live events rather than replaying.

mod broker;
mod envelope;
mod error;
mod subject;

pub use broker::{EventBroker, MemoryBroker, Subscription};
pub use envelope::{
    event_kinds, marshal_event, unmarshal_event, ApplicationUpdatedPayload, Envelope, Event,
    NameserverRecordPayload,
};
pub use error::EventError;
pub use subject::{subject_matches, subjects};
