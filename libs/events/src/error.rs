//! Error types for event handling.

use stellar_types::ErrorKind;
use thiserror::Error;

/// Errors that can occur when publishing, subscribing or decoding events.
#[derive(Debug, Error, Clone)]
pub enum EventError {
    /// The envelope's discriminator names no known payload variant.
    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),

    /// The subject is malformed for the attempted operation.
    #[error("invalid subject: {0}")]
    InvalidSubject(String),

    /// The payload could not be encoded or decoded.
    #[error("event serialization error: {0}")]
    Serialization(String),

    /// The broker connection is gone.
    #[error("event broker unavailable: {0}")]
    Unavailable(String),
}

impl EventError {
    /// The structural kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EventError::UnknownEventKind(_) | EventError::InvalidSubject(_) => {
                ErrorKind::InvalidArgument
            }
            EventError::Serialization(_) => ErrorKind::InvalidArgument,
            EventError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
