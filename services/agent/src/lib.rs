//! stellar cluster agent library.
//!
//! Every cluster member runs one agent process hosting the full set of core
//! services behind a single RPC listener:
//!
//! ```text
//! ServiceHost
//! ├── cluster      (membership view)
//! ├── health       (host diagnostics)
//! ├── events       (publish/subscribe plumbing)
//! ├── scheduler    (pure placement)
//! ├── network      (per-node subnet allocation)
//! ├── application  (service lifecycle + runtime driver)
//! └── proxy        (event-driven reload)
//! ```
//!
//! The host starts services in dependency order and stops them in reverse.
//! External collaborators (gossip membership, the replicated datastore, the
//! event bus and the container runtime) sit behind traits with local
//! reference implementations.

pub mod api;
pub mod client;
pub mod config;
pub mod heartbeat;
pub mod host;
pub mod membership;
pub mod resources;
pub mod runtime;
pub mod services;

pub use client::Client;
pub use config::Config;
pub use host::{HostError, Service, ServiceHost, ServiceType};
pub use membership::{MembershipOracle, StaticMembership};
pub use runtime::{Container, MockRuntime, RuntimeDriver};
