use crate::config::CacheConfig;
use crate::store::{CacheEntry, InMemoryStore, PreviewStore, ScanFilter};
use crate::utils::{host_matches_domain, host_of};
use crate::{PreviewError, PreviewRecord, PreviewSource};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Size an over-full cache is trimmed back to: roughly 90% of the cap, rounded up.
fn low_water_mark(max_entries: usize) -> usize {
    max_entries - max_entries / 10
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
    pub total_entries: usize,
    pub generated_at: DateTime<Utc>,
    pub config: CacheConfig,
}

/// URL-keyed preview cache with per-domain TTLs and lazy expiry.
///
/// Never fetches anything itself; keys are assumed to be already validated URLs.
#[derive(Clone)]
pub struct PreviewCache {
    store: Arc<dyn PreviewStore>,
    config: CacheConfig,
}

impl PreviewCache {
    pub fn new(store: Arc<dyn PreviewStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(Arc::new(InMemoryStore::new()), config)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PreviewStore> {
        &self.store
    }

    /// TTL in hours: an in-range override, else the longest matching domain suffix, else the default.
    pub fn determine_ttl(&self, url: &str, override_hours: Option<u64>) -> u64 {
        if let Some(hours) = override_hours {
            if (self.config.min_ttl_hours..=self.config.max_ttl_hours).contains(&hours) {
                return hours;
            }
            debug!(hours, "Ignoring out-of-range TTL override");
        }

        let Some(host) = host_of(url) else {
            return self.config.default_ttl_hours;
        };

        self.config
            .domain_ttls
            .iter()
            .filter(|rule| host_matches_domain(&host, &rule.suffix))
            .max_by_key(|rule| rule.suffix.trim_start_matches('.').len())
            .map(|rule| {
                rule.hours
                    .clamp(self.config.min_ttl_hours, self.config.max_ttl_hours)
            })
            .unwrap_or(self.config.default_ttl_hours)
    }

    /// Storable only when error-free, static, and carrying something to display.
    pub fn is_cacheable(record: &PreviewRecord) -> bool {
        let has = |field: &Option<String>| field.as_deref().is_some_and(|s| !s.trim().is_empty());
        !record.is_error()
            && !record.dynamic
            && (has(&record.title) || has(&record.description) || has(&record.image_url))
    }

    /// Project a record down to its durable fields.
    pub fn optimize(record: &PreviewRecord) -> PreviewRecord {
        PreviewRecord {
            url: record.url.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            image_url: record.image_url.clone(),
            favicon: record.favicon.clone(),
            site_name: record.site_name.clone(),
            canonical_url: record.canonical_url.clone(),
            content_type: record.content_type.clone(),
            is_first_party_official: record.is_first_party_official,
            official_service_name: record.official_service_name.clone(),
            service_enhancements: record.service_enhancements.clone(),
            quality_score: record.quality_score,
            content_hash: record.content_hash.clone(),
            source: PreviewSource::Fresh,
            from_cache: false,
            generated_at: record.generated_at,
            error: None,
            dynamic: false,
            fetch_duration_ms: None,
            extraction_sources: None,
        }
    }

    #[instrument(level = "debug", skip(self), err)]
    pub async fn get(&self, url: &str) -> Result<Option<PreviewRecord>, PreviewError> {
        let Some(entry) = self.store.get(url).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if entry.is_expired_at(now.timestamp()) {
            debug!(url = %url, "Cache entry expired, removing");
            if let Err(e) = self.store.delete(url).await {
                e.log();
            }
            return Ok(None);
        }

        // Access bookkeeping is best-effort and never rewrites the payload
        if let Err(e) = self.store.touch(url, now).await {
            warn!(url = %url, error = %e, "Failed to record cache access");
        }

        Ok(Some(entry.payload))
    }

    /// Returns `Ok(false)` when the record is not cacheable.
    #[instrument(level = "debug", skip(self, record), err)]
    pub async fn put(
        &self,
        url: &str,
        record: &PreviewRecord,
        ttl_hours_override: Option<u64>,
    ) -> Result<bool, PreviewError> {
        if !Self::is_cacheable(record) {
            debug!(url = %url, "Record not cacheable, skipping");
            return Ok(false);
        }

        let ttl_hours = self.determine_ttl(url, ttl_hours_override);
        let now = Utc::now();
        let ttl_secs = i64::try_from(ttl_hours)
            .unwrap_or(i64::MAX)
            .saturating_mul(3600);
        let entry = CacheEntry {
            key: url.to_string(),
            payload: Self::optimize(record),
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            expires_at: now.timestamp().saturating_add(ttl_secs),
        };
        self.store.put(entry).await?;
        debug!(url = %url, ttl_hours, "Cached preview");

        if let Some(max_entries) = self.config.max_entries {
            match self.store.count().await {
                Ok(count) if count > max_entries => {
                    if let Err(e) = self.evict_to_capacity(low_water_mark(max_entries)).await {
                        warn!(error = %e, "Capacity eviction failed");
                    }
                }
                Ok(_) => {}
                // The entry is already stored; only the capacity check is skipped
                Err(e) => warn!(error = %e, "Failed to count cache entries"),
            }
        }

        Ok(true)
    }

    pub async fn delete(&self, url: &str) -> Result<bool, PreviewError> {
        self.store.delete(url).await
    }

    /// One lookup per URL; failures for individual keys read as absent.
    pub async fn get_bulk(&self, urls: &[String]) -> HashMap<String, Option<PreviewRecord>> {
        let lookups = urls.iter().map(|url| async move {
            let record = match self.get(url).await {
                Ok(record) => record,
                Err(e) => {
                    e.log();
                    None
                }
            };
            (url.clone(), record)
        });
        join_all(lookups).await.into_iter().collect()
    }

    pub async fn statistics(&self) -> Result<CacheStatistics, PreviewError> {
        Ok(CacheStatistics {
            total_entries: self.store.count().await?,
            generated_at: Utc::now(),
            config: self.config.clone(),
        })
    }

    /// Active sweep of every expired entry. Returns how many were removed.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn cleanup_expired(&self) -> Result<usize, PreviewError> {
        let expired = self
            .store
            .scan(ScanFilter::ExpiredAt(Utc::now().timestamp()))
            .await?;

        let mut removed = 0;
        for entry in expired {
            if self.store.delete(&entry.key).await? {
                removed += 1;
            }
        }
        debug!(removed, "Expired cache entries cleaned up");
        Ok(removed)
    }

    /// Shrink to `max_entries`: expired entries go first, then the least recently accessed.
    ///
    /// `put` calls this with a target below the configured cap.
    pub async fn evict_to_capacity(&self, max_entries: usize) -> Result<usize, PreviewError> {
        let mut removed = self.cleanup_expired().await?;

        let mut entries = self.store.scan(ScanFilter::All).await?;
        if entries.len() > max_entries {
            entries.sort_by_key(|entry| entry.last_accessed_at);
            let excess = entries.len() - max_entries;
            for entry in entries.into_iter().take(excess) {
                if self.store.delete(&entry.key).await? {
                    removed += 1;
                }
            }
        }

        debug!(removed, max_entries, "Cache evicted to capacity");
        Ok(removed)
    }
}
