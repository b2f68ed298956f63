mod common;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::sample_record;
use feed_preview::{
    CacheConfig, CacheEntry, InMemoryStore, PreviewCache, PreviewError, PreviewRecord,
    PreviewStore, ScanFilter,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory store with a slow read path and a scan counter.
#[derive(Default)]
struct InstrumentedStore {
    inner: InMemoryStore,
    read_delay: Duration,
    scans: AtomicUsize,
    count_fails: bool,
}

impl InstrumentedStore {
    fn with_read_delay(read_delay: Duration) -> Self {
        Self {
            read_delay,
            ..Self::default()
        }
    }

    fn with_failing_count() -> Self {
        Self {
            count_fails: true,
            ..Self::default()
        }
    }

    fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PreviewStore for InstrumentedStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, PreviewError> {
        let entry = self.inner.get(key).await?;
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        Ok(entry)
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), PreviewError> {
        self.inner.put(entry).await
    }

    async fn delete(&self, key: &str) -> Result<bool, PreviewError> {
        self.inner.delete(key).await
    }

    async fn touch(&self, key: &str, accessed_at: DateTime<Utc>) -> Result<bool, PreviewError> {
        self.inner.touch(key, accessed_at).await
    }

    async fn scan(&self, filter: ScanFilter) -> Result<Vec<CacheEntry>, PreviewError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.inner.scan(filter).await
    }

    async fn count(&self) -> Result<usize, PreviewError> {
        if self.count_fails {
            return Err(PreviewError::CacheUnavailable("count timed out".into()));
        }
        self.inner.count().await
    }
}

fn titled(url: &str, title: &str) -> PreviewRecord {
    let mut record = sample_record(url);
    record.title = Some(title.to_string());
    record
}

fn cache() -> PreviewCache {
    PreviewCache::in_memory(CacheConfig::default())
}

fn entry_expiring_at(url: &str, expires_at: i64) -> CacheEntry {
    let now = Utc::now();
    CacheEntry {
        key: url.to_string(),
        payload: sample_record(url),
        created_at: now,
        last_accessed_at: now,
        access_count: 0,
        expires_at,
    }
}

#[test]
fn test_ttl_domain_table_and_defaults() {
    let cache = PreviewCache::in_memory(
        CacheConfig::default().with_domain_ttl("example-aws.com", 72),
    );

    assert_eq!(cache.determine_ttl("https://docs.example-aws.com/page", None), 72);
    assert_eq!(cache.determine_ttl("https://example-aws.com/", None), 72);
    assert_eq!(cache.determine_ttl("https://unregistered.org/", None), 24);
    // suffix matching respects label boundaries
    assert_eq!(cache.determine_ttl("https://notexample-aws.com/", None), 24);
    assert_eq!(cache.determine_ttl("https://github.com/rust-lang/rust", None), 48);
    assert_eq!(cache.determine_ttl("https://meta.stackexchange.com/q/1", None), 12);
}

#[test]
fn test_ttl_override_bounds() {
    let cache = cache();

    assert_eq!(cache.determine_ttl("https://unregistered.org/", Some(12)), 12);
    assert_eq!(cache.determine_ttl("https://unregistered.org/", Some(1)), 1);
    assert_eq!(cache.determine_ttl("https://unregistered.org/", Some(168)), 168);
    // out-of-range overrides fall through to the normal rules
    assert_eq!(cache.determine_ttl("https://unregistered.org/", Some(500)), 24);
    assert_eq!(cache.determine_ttl("https://unregistered.org/", Some(0)), 24);
    assert_eq!(cache.determine_ttl("https://github.com/", Some(500)), 48);
}

#[test]
fn test_ttl_longest_suffix_wins() {
    let config = CacheConfig {
        domain_ttls: Vec::new(),
        ..CacheConfig::default()
    }
    .with_domain_ttl("example.com", 10)
    .with_domain_ttl("docs.example.com", 100);
    let cache = PreviewCache::in_memory(config);

    assert_eq!(cache.determine_ttl("https://docs.example.com/a", None), 100);
    assert_eq!(cache.determine_ttl("https://api.docs.example.com/a", None), 100);
    assert_eq!(cache.determine_ttl("https://www.example.com/a", None), 10);
}

#[test]
fn test_ttl_table_values_are_clamped() {
    let cache = PreviewCache::in_memory(CacheConfig::default().with_domain_ttl("forever.io", 10_000));
    assert_eq!(cache.determine_ttl("https://forever.io/", None), 168);
}

#[test]
fn test_cacheability_rules() {
    assert!(!PreviewCache::is_cacheable(&PreviewRecord::failure(
        "https://a.com/",
        "boom"
    )));

    let mut site_only = PreviewRecord::new("https://a.com/");
    site_only.site_name = Some("A".into());
    assert!(!PreviewCache::is_cacheable(&site_only));

    let mut blank_title = PreviewRecord::new("https://a.com/");
    blank_title.title = Some("   ".into());
    assert!(!PreviewCache::is_cacheable(&blank_title));

    let mut title_only = PreviewRecord::new("https://a.com/");
    title_only.title = Some("A".into());
    assert!(PreviewCache::is_cacheable(&title_only));

    let mut image_only = PreviewRecord::new("https://a.com/");
    image_only.image_url = Some("https://a.com/i.png".into());
    assert!(PreviewCache::is_cacheable(&image_only));

    let mut dynamic = sample_record("https://a.com/");
    dynamic.dynamic = true;
    assert!(!PreviewCache::is_cacheable(&dynamic));
}

#[test]
fn test_optimize_drops_transient_fields() {
    let mut record = sample_record("https://a.com/");
    record.from_cache = true;
    record.extraction_sources = Some(Default::default());

    let optimized = PreviewCache::optimize(&record);
    assert_eq!(optimized.title, record.title);
    assert_eq!(optimized.quality_score, record.quality_score);
    assert!(optimized.fetch_duration_ms.is_none());
    assert!(optimized.extraction_sources.is_none());
    assert!(!optimized.from_cache);
}

#[tokio::test]
async fn test_put_then_get_is_idempotent() {
    let cache = cache();
    let url = "https://example.com/post";

    assert!(cache.put(url, &sample_record(url), None).await.unwrap());

    let first = cache.get(url).await.unwrap().expect("hit");
    let second = cache.get(url).await.unwrap().expect("hit");
    assert_eq!(first, second);
    assert_eq!(first.title.as_deref(), Some("Preview of https://example.com/post"));

    let entry = cache.store().get(url).await.unwrap().unwrap();
    assert_eq!(entry.access_count, 2);
    assert!(entry.expires_at > Utc::now().timestamp());
}

#[tokio::test]
async fn test_put_records_ttl_in_expiry() {
    let cache = cache();
    let url = "https://github.com/rust-lang/rust";
    let before = Utc::now().timestamp();

    cache.put(url, &sample_record(url), None).await.unwrap();

    let entry = cache.store().get(url).await.unwrap().unwrap();
    let ttl = entry.expires_at - before;
    assert!((48 * 3600..=48 * 3600 + 5).contains(&ttl));
}

#[tokio::test]
async fn test_uncacheable_records_are_not_stored() {
    let cache = cache();
    let url = "https://example.com/broken";

    let stored = cache
        .put(url, &PreviewRecord::failure(url, "HTTP 500"), None)
        .await
        .unwrap();
    assert!(!stored);

    let mut dynamic = sample_record(url);
    dynamic.dynamic = true;
    assert!(!cache.put(url, &dynamic, None).await.unwrap());

    assert!(cache.get(url).await.unwrap().is_none());
    assert_eq!(cache.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_expired_entry_is_removed_on_read() {
    let cache = cache();
    let url = "https://example.com/stale";
    cache
        .store()
        .put(entry_expiring_at(url, Utc::now().timestamp() - 1))
        .await
        .unwrap();

    assert!(cache.get(url).await.unwrap().is_none());
    assert!(cache.store().get(url).await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_bulk_maps_every_url() {
    let cache = cache();
    let hit = "https://example.com/hit".to_string();
    let miss = "https://example.com/miss".to_string();
    cache.put(&hit, &sample_record(&hit), None).await.unwrap();

    let results = cache.get_bulk(&[hit.clone(), miss.clone()]).await;
    assert_eq!(results.len(), 2);
    assert!(results[&hit].is_some());
    assert!(results[&miss].is_none());
}

#[tokio::test]
async fn test_statistics_do_not_touch_entries() {
    let cache = cache();
    let url = "https://example.com/stats";
    cache.put(url, &sample_record(url), None).await.unwrap();

    let stats = cache.statistics().await.unwrap();
    assert_eq!(stats.total_entries, 1);
    assert_eq!(stats.config, CacheConfig::default());

    let entry = cache.store().get(url).await.unwrap().unwrap();
    assert_eq!(entry.access_count, 0);
}

#[tokio::test]
async fn test_cleanup_expired_reports_removed_count() {
    let cache = cache();
    let now = Utc::now().timestamp();
    for (i, offset) in [-10, -1, 3600].iter().enumerate() {
        let url = format!("https://e{i}.com/");
        cache
            .store()
            .put(entry_expiring_at(&url, now + offset))
            .await
            .unwrap();
    }

    assert_eq!(cache.cleanup_expired().await.unwrap(), 2);
    assert_eq!(cache.store().count().await.unwrap(), 1);
    assert_eq!(cache.cleanup_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn test_evict_to_capacity_prefers_expired_then_least_recent() {
    let cache = cache();
    let now = Utc::now();
    let future = now.timestamp() + 3600;

    let mut expired = entry_expiring_at("https://expired.com/", now.timestamp() - 1);
    expired.last_accessed_at = now;
    let mut oldest = entry_expiring_at("https://oldest.com/", future);
    oldest.last_accessed_at = now - ChronoDuration::hours(3);
    let mut older = entry_expiring_at("https://older.com/", future);
    older.last_accessed_at = now - ChronoDuration::hours(2);
    let mut recent = entry_expiring_at("https://recent.com/", future);
    recent.last_accessed_at = now;

    for entry in [expired, oldest, older, recent] {
        cache.store().put(entry).await.unwrap();
    }

    assert_eq!(cache.evict_to_capacity(2).await.unwrap(), 2);
    assert!(cache.store().get("https://expired.com/").await.unwrap().is_none());
    assert!(cache.store().get("https://oldest.com/").await.unwrap().is_none());
    assert!(cache.store().get("https://older.com/").await.unwrap().is_some());
    assert!(cache.store().get("https://recent.com/").await.unwrap().is_some());
}

#[tokio::test]
async fn test_put_beyond_max_entries_evicts() {
    let cache = PreviewCache::in_memory(CacheConfig::default().with_max_entries(Some(2)));

    for i in 0..3 {
        let url = format!("https://site{i}.com/");
        cache.put(&url, &sample_record(&url), None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    assert_eq!(cache.store().count().await.unwrap(), 2);
    assert!(cache.store().get("https://site0.com/").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_reports_presence() {
    let cache = cache();
    let url = "https://example.com/gone";
    cache.put(url, &sample_record(url), None).await.unwrap();

    assert!(cache.delete(url).await.unwrap());
    assert!(!cache.delete(url).await.unwrap());
}

#[tokio::test]
async fn test_read_does_not_resurrect_concurrently_deleted_entry() {
    let store = Arc::new(InstrumentedStore::with_read_delay(Duration::from_millis(50)));
    let cache = PreviewCache::new(store.clone(), CacheConfig::default());
    let url = "https://example.com/invalidated";
    cache.put(url, &titled(url, "old title"), None).await.unwrap();

    let (read, deleted) = tokio::join!(cache.get(url), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.delete(url).await
    });

    assert!(read.unwrap().is_some());
    assert!(deleted.unwrap());
    assert!(store.inner.get(url).await.unwrap().is_none());
}

#[tokio::test]
async fn test_read_does_not_clobber_concurrent_write() {
    let store = Arc::new(InstrumentedStore::with_read_delay(Duration::from_millis(50)));
    let cache = PreviewCache::new(store.clone(), CacheConfig::default());
    let url = "https://example.com/refreshed";
    cache.put(url, &titled(url, "old title"), None).await.unwrap();

    let (read, written) = tokio::join!(cache.get(url), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.put(url, &titled(url, "fresh title"), None).await
    });

    assert_eq!(read.unwrap().unwrap().title.as_deref(), Some("old title"));
    assert!(written.unwrap());
    let stored = store.inner.get(url).await.unwrap().unwrap();
    assert_eq!(stored.payload.title.as_deref(), Some("fresh title"));
    // The hit is still counted against the entry that is now stored
    assert_eq!(stored.access_count, 1);
}

#[tokio::test]
async fn test_full_cache_is_trimmed_below_cap() {
    let store = Arc::new(InstrumentedStore::default());
    let cache = PreviewCache::new(
        store.clone(),
        CacheConfig::default().with_max_entries(Some(20)),
    );

    for i in 0..30 {
        let url = format!("https://site{i}.com/");
        cache.put(&url, &sample_record(&url), None).await.unwrap();
        assert!(store.count().await.unwrap() <= 20);
    }

    // Overflows at puts 21, 24, 27 and 30, each trimming back to 18 with two scans
    assert_eq!(store.scans(), 8);
    assert_eq!(store.count().await.unwrap(), 18);
}

#[tokio::test]
async fn test_put_succeeds_when_capacity_check_fails() {
    let store = Arc::new(InstrumentedStore::with_failing_count());
    let cache = PreviewCache::new(store.clone(), CacheConfig::default());
    let url = "https://example.com/counted";

    assert!(cache.put(url, &sample_record(url), None).await.unwrap());
    assert!(store.inner.get(url).await.unwrap().is_some());
    assert_eq!(store.scans(), 0);
}
