//! # stellar-datastore
//!
//! Interface to the cluster's replicated key-value store.
//!
//! The real store is gossip-backed and eventually consistent; this crate only
//! defines the seam the services program against plus an in-memory reference
//! implementation used for local development and tests. Values are opaque
//! bytes grouped into named buckets; keys within a bucket are flat strings
//! with dotted prefixes by convention (`subnets.<node>`, `apps.<name>`).

mod memory;

use async_trait::async_trait;
use stellar_types::ErrorKind;
use thiserror::Error;

pub use memory::MemoryDatastore;

/// Errors from datastore operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No value under the key.
    #[error("key not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// The key already exists and overwrite was not requested.
    #[error("key already exists: {bucket}/{key}")]
    Conflict { bucket: String, key: String },

    /// The store could not be reached.
    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// The structural kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Conflict { .. } => ErrorKind::InvalidArgument,
            StoreError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    /// True for the not-found case, which callers routinely recover from.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// A key and its stored value, as returned by prefix search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
}

/// The replicated key-value store the cluster shares.
///
/// Writes are serialized per key on a best-effort basis only; readers may
/// observe stale values until gossip converges.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Fetch the value under `key`.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Store `value` under `key`. With `overwrite` false the write fails if
    /// the key already exists.
    async fn set(
        &self,
        bucket: &str,
        key: &str,
        value: Vec<u8>,
        overwrite: bool,
    ) -> Result<(), StoreError>;

    /// All pairs whose key starts with `prefix`, in key order.
    async fn search(&self, bucket: &str, prefix: &str) -> Result<Vec<KvPair>, StoreError>;

    /// Remove the value under `key`.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;
}
