//! Key-value persistence behind the preview cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{PreviewError, PreviewRecord};

/// Persisted wrapper around an optimized preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub payload: PreviewRecord,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    /// Epoch seconds.
    pub expires_at: i64,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now_epoch_secs: i64) -> bool {
        self.expires_at <= now_epoch_secs
    }
}

/// Server-side filter for [`PreviewStore::scan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFilter {
    All,
    /// Entries whose `expires_at` is at or before the given epoch second.
    ExpiredAt(i64),
}

impl ScanFilter {
    pub fn matches(&self, entry: &CacheEntry) -> bool {
        match *self {
            ScanFilter::All => true,
            ScanFilter::ExpiredAt(now) => entry.is_expired_at(now),
        }
    }
}

/// Backing store for cache entries. No per-key locking: the last write wins.
#[async_trait]
pub trait PreviewStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, PreviewError>;

    async fn put(&self, entry: CacheEntry) -> Result<(), PreviewError>;

    /// Returns whether an entry existed.
    async fn delete(&self, key: &str) -> Result<bool, PreviewError>;

    /// Bump `access_count` and set `last_accessed_at` on an existing entry, leaving the
    /// payload alone. Never recreates a missing key; returns whether the key existed.
    async fn touch(&self, key: &str, accessed_at: DateTime<Utc>) -> Result<bool, PreviewError>;

    async fn scan(&self, filter: ScanFilter) -> Result<Vec<CacheEntry>, PreviewError>;

    async fn count(&self) -> Result<usize, PreviewError> {
        Ok(self.scan(ScanFilter::All).await?.len())
    }
}

/// Process-local store, the default backing for a single node and for tests.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, CacheEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

}

#[async_trait]
impl PreviewStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, PreviewError> {
        Ok(self.entries.get(key).map(|entry| entry.clone()))
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), PreviewError> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, PreviewError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn touch(&self, key: &str, accessed_at: DateTime<Utc>) -> Result<bool, PreviewError> {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.access_count += 1;
                entry.last_accessed_at = accessed_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scan(&self, filter: ScanFilter) -> Result<Vec<CacheEntry>, PreviewError> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn count(&self) -> Result<usize, PreviewError> {
        Ok(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, expires_at: i64) -> CacheEntry {
        let now = Utc::now();
        CacheEntry {
            key: key.to_string(),
            payload: PreviewRecord::new(key),
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryStore::new();
        store.put(entry("https://a.com", 100)).await.unwrap();

        assert!(store.get("https://a.com").await.unwrap().is_some());
        assert!(store.delete("https://a.com").await.unwrap());
        assert!(!store.delete("https://a.com").await.unwrap());
        assert!(store.get("https://a.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_touch_updates_counters_only() {
        let store = InMemoryStore::new();
        let original = entry("https://a.com", 100);
        store.put(original.clone()).await.unwrap();

        let later = original.last_accessed_at + chrono::Duration::seconds(5);
        assert!(store.touch("https://a.com", later).await.unwrap());

        let touched = store.get("https://a.com").await.unwrap().unwrap();
        assert_eq!(touched.access_count, 1);
        assert_eq!(touched.last_accessed_at, later);
        assert_eq!(touched.payload, original.payload);
        assert_eq!(touched.expires_at, original.expires_at);
    }

    #[tokio::test]
    async fn test_touch_does_not_recreate_missing_key() {
        let store = InMemoryStore::new();
        assert!(!store.touch("https://gone.com", Utc::now()).await.unwrap());
        assert!(store.get("https://gone.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scan_expired_filter() {
        let store = InMemoryStore::new();
        store.put(entry("https://old.com", 10)).await.unwrap();
        store.put(entry("https://edge.com", 20)).await.unwrap();
        store.put(entry("https://new.com", 30)).await.unwrap();

        let mut expired: Vec<_> = store
            .scan(ScanFilter::ExpiredAt(20))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        expired.sort();
        assert_eq!(expired, vec!["https://edge.com", "https://old.com"]);
        assert_eq!(store.count().await.unwrap(), 3);
    }
}
