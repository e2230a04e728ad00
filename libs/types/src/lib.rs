//! # stellar-types
//!
//! The cluster data model shared by every stellar service: nodes and peers as
//! gossip reports them, application and service specifications as users submit
//! them, IPv4 CIDR arithmetic for the subnet allocator, and the structural
//! error taxonomy carried across RPC boundaries.
//!
//! Nothing in this crate performs I/O; these are plain serializable values.

mod app;
mod cidr;
mod error;
mod node;

pub use app::{App, Endpoint, PlacementPreference, Protocol, ServiceSpec};
pub use cidr::{Cidr, CidrError};
pub use error::ErrorKind;
pub use node::{Node, Peer};
