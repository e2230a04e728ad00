//! Structural error kinds carried across RPC boundaries.

use serde::{Deserialize, Serialize};

/// The error taxonomy every stellar RPC surfaces.
///
/// Kinds travel on the wire next to a human-readable message so callers can
/// branch on the kind without parsing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No record under the given key.
    NotFound,

    /// Malformed input or an unsupported combination of fields.
    InvalidArgument,

    /// A finite resource ran out.
    Exhausted,

    /// A peer or the datastore could not be reached.
    Unavailable,

    /// Programmer error; not actionable by the caller.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Exhausted => "exhausted",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}
