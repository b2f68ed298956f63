#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_preview::{
    CacheEntry, ExtractOptions, MetadataSource, PreviewCache, PreviewConfig, PreviewError,
    PreviewRecord, PreviewService, PreviewStore, ScanFilter,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A `MetadataSource` whose outcomes are fixed per URL.
#[derive(Default)]
pub struct ScriptedSource {
    always_failing: HashSet<String>,
    failures_left: Mutex<HashMap<String, usize>>,
    delay: Duration,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn always_failing(mut self, url: &str) -> Self {
        self.always_failing.insert(url.to_string());
        self
    }

    pub fn failing_first(self, url: &str, failures: usize) -> Self {
        self.failures_left
            .lock()
            .unwrap()
            .insert(url.to_string(), failures);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

pub fn sample_record(url: &str) -> PreviewRecord {
    let mut record = PreviewRecord::new(url);
    record.title = Some(format!("Preview of {url}"));
    record.description = Some("A description that is comfortably long enough to earn a bonus.".into());
    record.image_url = Some("http://cdn.example.com/cover.png".into());
    record.site_name = Some("Example".into());
    record.fetch_duration_ms = Some(12);
    record
}

#[async_trait]
impl MetadataSource for ScriptedSource {
    async fn extract(
        &self,
        url: &str,
        _options: ExtractOptions,
    ) -> Result<PreviewRecord, PreviewError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.always_failing.contains(url) {
            return Err(PreviewError::FetchNetworkError(format!(
                "connection refused: {url}"
            )));
        }

        let mut failures = self.failures_left.lock().unwrap();
        if let Some(left) = failures.get_mut(url) {
            if *left > 0 {
                *left -= 1;
                return Err(PreviewError::FetchTimeout(format!("timed out: {url}")));
            }
        }

        Ok(sample_record(url))
    }
}

/// Store whose every operation fails.
pub struct UnavailableStore;

#[async_trait]
impl PreviewStore for UnavailableStore {
    async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, PreviewError> {
        Err(PreviewError::CacheUnavailable("store offline".into()))
    }

    async fn put(&self, _entry: CacheEntry) -> Result<(), PreviewError> {
        Err(PreviewError::CacheUnavailable("store offline".into()))
    }

    async fn delete(&self, _key: &str) -> Result<bool, PreviewError> {
        Err(PreviewError::CacheUnavailable("store offline".into()))
    }

    async fn touch(
        &self,
        _key: &str,
        _accessed_at: DateTime<Utc>,
    ) -> Result<bool, PreviewError> {
        Err(PreviewError::CacheUnavailable("store offline".into()))
    }

    async fn scan(&self, _filter: ScanFilter) -> Result<Vec<CacheEntry>, PreviewError> {
        Err(PreviewError::CacheUnavailable("store offline".into()))
    }
}

/// Config with fast retries, suitable for tests.
pub fn test_config() -> PreviewConfig {
    let mut config = PreviewConfig::default();
    config.orchestrator.retry_base_delay_ms = 10;
    config
}

pub fn service_with(source: Arc<ScriptedSource>, config: PreviewConfig) -> PreviewService {
    let cache = PreviewCache::in_memory(config.cache.clone());
    PreviewService::with_components(config, source, cache)
}

/// Poll the backing store until the background write lands.
pub async fn wait_for_stored(cache: &PreviewCache, url: &str) -> Option<CacheEntry> {
    for _ in 0..200 {
        if let Ok(Some(entry)) = cache.store().get(url).await {
            return Some(entry);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    None
}
