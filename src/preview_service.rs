use crate::cache::{CacheStatistics, PreviewCache};
use crate::config::{PreviewConfig, MAX_BATCH_CONCURRENCY};
use crate::enhancer::{quality_score, Enhancer};
use crate::extractor::MetadataExtractor;
use crate::security::UrlValidator;
use crate::store::PreviewStore;
use crate::utils::truncate_chars;
use crate::{ExtractOptions, MetadataSource, PreviewError, PreviewRecord, PreviewSource};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, instrument, warn};
use url::Url;

/// Error message carried by records for URLs that fail syntax validation.
pub const INVALID_URL_MESSAGE: &str = "Invalid URL format";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewOptions {
    pub force_refresh: bool,
    pub enhance: bool,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            force_refresh: false,
            enhance: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchOptions {
    pub force_refresh: bool,
    pub enhance: bool,
    pub preserve_order: bool,
    /// In-flight cap for this call, clamped to 1..=10.
    pub concurrency: Option<usize>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            force_refresh: false,
            enhance: true,
            preserve_order: true,
            concurrency: None,
        }
    }
}

impl BatchOptions {
    fn preview_options(&self) -> PreviewOptions {
        PreviewOptions {
            force_refresh: self.force_refresh,
            enhance: self.enhance,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPreviews {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub previews: Vec<PreviewRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// PreviewService is the public entry point of the pipeline.
///
/// Single URLs go cache → extractor (with retries) → enhancement → background cache write.
/// Batches run the same flow under a concurrency cap.
#[derive(Clone)]
pub struct PreviewService {
    source: Arc<dyn MetadataSource>,
    cache: PreviewCache,
    validator: UrlValidator,
    enhancer: Enhancer,
    config: Arc<PreviewConfig>,
}

impl Default for PreviewService {
    fn default() -> Self {
        Self::new(PreviewConfig::default())
    }
}

impl PreviewService {
    /// HTTP extractor over an in-memory store.
    pub fn new(config: PreviewConfig) -> Self {
        let cache = PreviewCache::in_memory(config.cache.clone());
        Self::with_cache(config, cache)
    }

    pub fn with_store(config: PreviewConfig, store: Arc<dyn PreviewStore>) -> Self {
        let cache = PreviewCache::new(store, config.cache.clone());
        Self::with_cache(config, cache)
    }

    fn with_cache(config: PreviewConfig, cache: PreviewCache) -> Self {
        let validator = UrlValidator::new(config.validation.clone());
        let extractor = MetadataExtractor::new(&config.extractor, validator);
        Self::with_components(config, Arc::new(extractor), cache)
    }

    pub fn with_components(
        config: PreviewConfig,
        source: Arc<dyn MetadataSource>,
        cache: PreviewCache,
    ) -> Self {
        debug!(
            retry_attempts = config.orchestrator.retry_attempts,
            batch_concurrency = config.orchestrator.batch_concurrency,
            "PreviewService initialized"
        );
        Self {
            source,
            cache,
            validator: UrlValidator::new(config.validation.clone()),
            enhancer: Enhancer::new(config.orchestrator.max_description_length),
            config: Arc::new(config),
        }
    }

    pub fn cache(&self) -> &PreviewCache {
        &self.cache
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn validate_url(&self, url: &str) -> Result<Url, PreviewError> {
        self.validator.validate(url)
    }

    /// Re-run the enhancement pass on an arbitrary record.
    pub fn enhance(&self, record: PreviewRecord) -> PreviewRecord {
        self.enhancer.enhance(record)
    }

    /// Never fails: problems surface as error-shaped records.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_preview(&self, url: &str, options: PreviewOptions) -> PreviewRecord {
        // Keyed by the trimmed URL the validator accepts
        let url = url.trim();
        if let Err(e) = self.validator.validate(url) {
            debug!(url = %url, error = %e, "Rejecting invalid URL");
            return PreviewRecord::failure(url, INVALID_URL_MESSAGE);
        }

        if !options.force_refresh {
            match self.cache.get(url).await {
                Ok(Some(mut cached)) => {
                    debug!(url = %url, "Cache hit");
                    cached.source = PreviewSource::Cache;
                    cached.from_cache = true;
                    return cached;
                }
                Ok(None) => debug!(url = %url, "Cache miss"),
                // An unavailable cache reads as a miss
                Err(e) => e.log(),
            }
        }

        let extract_options = ExtractOptions {
            force_refresh: options.force_refresh,
            timeout_ms: None,
        };

        match self.extract_with_retry(url, extract_options).await {
            Ok(raw) => {
                let record = self.finalize(url, raw, options.enhance);
                self.log_card(url, &record);
                self.store_in_background(url, record.clone());
                record
            }
            Err(e) => {
                error!(url = %url, error = %e, "Preview extraction failed after retries");
                #[cfg(feature = "logging")]
                if self.config.orchestrator.log_preview_cards {
                    crate::logging::log_error_card(url, &e);
                }
                PreviewRecord::failure(url, e.to_string())
            }
        }
    }

    /// `1 + retry_attempts` tries with linear backoff, stopping at the first success.
    async fn extract_with_retry(
        &self,
        url: &str,
        options: ExtractOptions,
    ) -> Result<PreviewRecord, PreviewError> {
        let attempts = 1 + self.config.orchestrator.retry_attempts;
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.source.extract(url, options).await {
                Ok(record) => {
                    debug!(url = %url, attempt, "Extraction succeeded");
                    return Ok(record);
                }
                Err(e) => {
                    warn!(url = %url, attempt, error = %e, "Extraction attempt failed");
                    let retry = e.is_retryable() && attempt < attempts;
                    last_error = Some(e);
                    if !retry {
                        break;
                    }
                    tokio::time::sleep(self.config.orchestrator.retry_delay(attempt)).await;
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| PreviewError::FetchNetworkError("no attempt was made".into())))
    }

    fn finalize(&self, url: &str, mut record: PreviewRecord, enhance: bool) -> PreviewRecord {
        record.url = url.to_string();
        record.source = PreviewSource::Fresh;
        record.from_cache = false;
        record.generated_at = Utc::now();

        if enhance {
            return self.enhancer.enhance(record);
        }

        let max = self.config.orchestrator.max_description_length;
        record.description = record.description.map(|d| truncate_chars(&d, max));
        record.refresh_content_hash();
        record.quality_score = quality_score(&record);
        record
    }

    /// Detached write; the response never waits on it and failures are only logged.
    fn store_in_background(&self, url: &str, record: PreviewRecord) {
        let cache = self.cache.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            match cache.put(&url, &record, None).await {
                Ok(true) => debug!(url = %url, "Preview cached"),
                Ok(false) => debug!(url = %url, "Preview not cacheable"),
                Err(e) => warn!(url = %url, error = %e, "Background cache write failed"),
            }
        });
    }

    #[allow(unused_variables)]
    fn log_card(&self, url: &str, record: &PreviewRecord) {
        #[cfg(feature = "logging")]
        if self.config.orchestrator.log_preview_cards {
            crate::logging::log_preview_card(record, url);
        }
    }

    /// Rejects empty or oversized input outright; otherwise every URL resolves to a record.
    #[instrument(level = "debug", skip(self, urls), fields(count = urls.len()))]
    pub async fn get_batch_previews(
        &self,
        urls: &[String],
        options: BatchOptions,
    ) -> Result<BatchPreviews, PreviewError> {
        if urls.is_empty() {
            return Err(PreviewError::InvalidBatch(
                "urls must be a non-empty array".into(),
            ));
        }
        let max = self.config.orchestrator.max_batch_size;
        if urls.len() > max {
            return Err(PreviewError::BatchLimitExceeded {
                count: urls.len(),
                max,
            });
        }

        let mut results: Vec<(usize, PreviewRecord)> = Vec::with_capacity(urls.len());
        let mut valid = Vec::new();
        for (index, url) in urls.iter().enumerate() {
            if self.validator.is_valid(url) {
                valid.push((index, url.as_str()));
            } else {
                results.push((index, PreviewRecord::failure(url.as_str(), INVALID_URL_MESSAGE)));
            }
        }
        let invalid_count = results.len();
        let valid_count = valid.len();

        let concurrency = options
            .concurrency
            .unwrap_or(self.config.orchestrator.batch_concurrency)
            .clamp(1, MAX_BATCH_CONCURRENCY);
        debug!(valid = valid_count, invalid = invalid_count, concurrency, "Dispatching batch");

        // Max Concurrent Requests
        let semaphore = Semaphore::new(concurrency);
        let semaphore = &semaphore;
        let preview_options = options.preview_options();

        let mut in_flight: FuturesUnordered<_> = valid
            .into_iter()
            .map(|(index, url)| async move {
                let _permit = semaphore.acquire().await;
                (index, self.get_preview(url, preview_options).await)
            })
            .collect();

        while let Some(done) = in_flight.next().await {
            results.push(done);
        }

        if options.preserve_order {
            results.sort_by_key(|(index, _)| *index);
        }

        Ok(BatchPreviews {
            total: urls.len(),
            valid: valid_count,
            invalid: invalid_count,
            previews: results.into_iter().map(|(_, record)| record).collect(),
        })
    }

    pub async fn statistics(&self) -> Result<CacheStatistics, PreviewError> {
        self.cache.statistics().await
    }

    pub async fn health(&self) -> HealthReport {
        match self.cache.statistics().await {
            Ok(stats) => HealthReport {
                status: HealthStatus::Healthy,
                cache: Some(stats),
                error: None,
                checked_at: Utc::now(),
            },
            Err(e) => {
                e.log();
                HealthReport {
                    status: HealthStatus::Degraded,
                    cache: None,
                    error: Some(e.to_string()),
                    checked_at: Utc::now(),
                }
            }
        }
    }
}
