//! In-memory datastore for local development and tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Datastore, KvPair, StoreError};

type Bucket = BTreeMap<String, Vec<u8>>;

/// A process-local [`Datastore`].
///
/// Buckets are created on first write. Key order inside a bucket is
/// lexicographic, so searches are deterministic.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    buckets: RwLock<BTreeMap<String, Bucket>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let buckets = self.buckets.read().await;
        buckets
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn set(
        &self,
        bucket: &str,
        key: &str,
        value: Vec<u8>,
        overwrite: bool,
    ) -> Result<(), StoreError> {
        let mut buckets = self.buckets.write().await;
        let b = buckets.entry(bucket.to_string()).or_default();
        if !overwrite && b.contains_key(key) {
            return Err(StoreError::Conflict {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        b.insert(key.to_string(), value);
        Ok(())
    }

    async fn search(&self, bucket: &str, prefix: &str) -> Result<Vec<KvPair>, StoreError> {
        let buckets = self.buckets.read().await;
        let Some(b) = buckets.get(bucket) else {
            return Ok(Vec::new());
        };

        Ok(b.range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| KvPair {
                key: k.clone(),
                value: v.clone(),
            })
            .collect())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let mut buckets = self.buckets.write().await;
        let removed = buckets.get_mut(bucket).and_then(|b| b.remove(key));
        if removed.is_none() {
            return Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryDatastore::new();
        let err = store.get("b", "k").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = MemoryDatastore::new();
        store.set("b", "k", b"v".to_vec(), true).await.unwrap();
        assert_eq!(store.get("b", "k").await.unwrap(), b"v");
    }

    #[tokio::test]
    async fn test_set_without_overwrite_conflicts() {
        let store = MemoryDatastore::new();
        store.set("b", "k", b"v1".to_vec(), false).await.unwrap();
        let err = store.set("b", "k", b"v2".to_vec(), false).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.get("b", "k").await.unwrap(), b"v1");
    }

    #[tokio::test]
    async fn test_search_by_prefix_in_key_order() {
        let store = MemoryDatastore::new();
        store
            .set("net", "subnets.node-01", b"10.0.1.0/24".to_vec(), true)
            .await
            .unwrap();
        store
            .set("net", "subnets.node-00", b"10.0.0.0/24".to_vec(), true)
            .await
            .unwrap();
        store
            .set("net", "gateway", b"10.0.0.1".to_vec(), true)
            .await
            .unwrap();

        let pairs = store.search("net", "subnets.").await.unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].key, "subnets.node-00");
        assert_eq!(pairs[1].key, "subnets.node-01");
    }

    #[tokio::test]
    async fn test_search_unknown_bucket_is_empty() {
        let store = MemoryDatastore::new();
        assert!(store.search("nope", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryDatastore::new();
        store.set("b", "k", b"v".to_vec(), true).await.unwrap();
        store.delete("b", "k").await.unwrap();
        assert!(store.get("b", "k").await.unwrap_err().is_not_found());
        assert!(store.delete("b", "k").await.unwrap_err().is_not_found());
    }
}
