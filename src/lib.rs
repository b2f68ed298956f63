use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod cache;
mod config;
mod enhancer;
mod error;
mod extractor;
mod fetcher;
mod hash;
#[cfg(feature = "logging")]
mod logging;
mod preview_service;
mod security;
#[cfg(feature = "server")]
pub mod server;
mod store;
mod utils;

pub use cache::{CacheStatistics, PreviewCache};
pub use config::{
    CacheConfig, ConfigError, DomainTtl, ExtractorConfig, OrchestratorConfig, PreviewConfig,
    ServerConfig, MAX_BATCH_CONCURRENCY,
};
pub use enhancer::{classify_doc_type, quality_score, service_profile, Enhancer, ServiceProfile};
pub use error::PreviewError;
pub use extractor::{classify_first_party, MetadataExtractor};
pub use fetcher::{FetchedPage, Fetcher};
pub use hash::content_hash;
#[cfg(feature = "logging")]
pub use logging::{
    log_error_card, log_preview_card, setup_logging, LogConfig, LogLevelGuard, LoggingError,
};
pub use preview_service::{
    BatchOptions, BatchPreviews, HealthReport, HealthStatus, PreviewOptions, PreviewService,
    INVALID_URL_MESSAGE,
};
pub use security::{UrlValidationConfig, UrlValidator};
pub use store::{CacheEntry, InMemoryStore, PreviewStore, ScanFilter};

/// Where a preview came from on this call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewSource {
    #[default]
    Fresh,
    Cache,
}

fn default_content_type() -> String {
    "website".to_string()
}

/// The structured preview of one URL, either a normal record or an error record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRecord {
    #[serde(default)]
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Always absolute.
    pub image_url: Option<String>,
    pub favicon: Option<String>,
    pub site_name: Option<String>,
    pub canonical_url: Option<String>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub is_first_party_official: bool,
    pub official_service_name: Option<String>,
    pub service_enhancements: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub quality_score: u8,
    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub source: PreviewSource,
    #[serde(default)]
    pub from_cache: bool,
    #[serde(default = "Utc::now")]
    pub generated_at: DateTime<Utc>,
    pub error: Option<String>,

    /// Origin asked not to store this response.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dynamic: bool,
    // Transient diagnostics, never persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_sources: Option<BTreeMap<String, String>>,
}

impl PreviewRecord {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let content_hash = content_hash(&url, None, None);
        Self {
            url,
            title: None,
            description: None,
            image_url: None,
            favicon: None,
            site_name: None,
            canonical_url: None,
            content_type: default_content_type(),
            is_first_party_official: false,
            official_service_name: None,
            service_enhancements: None,
            quality_score: 0,
            content_hash,
            source: PreviewSource::Fresh,
            from_cache: false,
            generated_at: Utc::now(),
            error: None,
            dynamic: false,
            fetch_duration_ms: None,
            extraction_sources: None,
        }
    }

    /// Error-shaped record: score 0, hostname as a best-effort title.
    pub fn failure(url: impl Into<String>, message: impl Into<String>) -> Self {
        let mut record = Self::new(url);
        record.title = utils::host_of(&record.url);
        record.error = Some(message.into());
        record.refresh_content_hash();
        record
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn refresh_content_hash(&mut self) {
        self.content_hash = content_hash(
            &self.url,
            self.title.as_deref(),
            self.description.as_deref(),
        );
    }
}

/// Options for a single extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Ask the origin and intermediaries to bypass their own caches.
    pub force_refresh: bool,
    /// Overrides the configured per-attempt timeout.
    pub timeout_ms: Option<u64>,
}

/// Produces raw preview metadata for a URL.
///
/// Implemented by [`MetadataExtractor`]; tests substitute scripted sources.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn extract(
        &self,
        url: &str,
        options: ExtractOptions,
    ) -> Result<PreviewRecord, PreviewError>;
}
