//! Pipeline configuration with layered loading.
//!
//! Loading precedence (highest wins):
//! 1. Environment variables (`FEED_PREVIEW_*`, nested keys split on `__`)
//! 2. TOML config file (if `FEED_PREVIEW_CONFIG_FILE` is set)
//! 3. Built-in defaults

use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::security::UrlValidationConfig;

/// Upper bound on in-flight extractions for a single batch call.
pub const MAX_BATCH_CONCURRENCY: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub validation: UrlValidationConfig,
    pub extractor: ExtractorConfig,
    pub cache: CacheConfig,
    pub orchestrator: OrchestratorConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Per-attempt HTTP timeout.
    pub timeout_ms: u64,
    /// Responses larger than this are rejected.
    pub max_response_bytes: usize,
    pub user_agent: String,
    /// Hosts (and their subdomains) treated as first-party official sites.
    pub first_party_domains: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_response_bytes: 5 * 1024 * 1024,
            user_agent: concat!("feed-preview/", env!("CARGO_PKG_VERSION")).to_string(),
            first_party_domains: vec![
                "aws.amazon.com".into(),
                "amazonaws.com".into(),
                "awsstatic.com".into(),
            ],
        }
    }
}

impl ExtractorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_response_bytes(mut self, max_response_bytes: usize) -> Self {
        self.max_response_bytes = max_response_bytes;
        self
    }

    pub fn with_first_party_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.first_party_domains = domains.into_iter().map(Into::into).collect();
        self
    }
}

/// TTL assigned to a host suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainTtl {
    pub suffix: String,
    pub hours: u64,
}

impl DomainTtl {
    pub fn new(suffix: impl Into<String>, hours: u64) -> Self {
        Self {
            suffix: suffix.into(),
            hours,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub default_ttl_hours: u64,
    pub min_ttl_hours: u64,
    pub max_ttl_hours: u64,
    pub domain_ttls: Vec<DomainTtl>,
    /// Soft cap on stored entries; `None` disables capacity eviction.
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_hours: 24,
            min_ttl_hours: 1,
            max_ttl_hours: 168,
            domain_ttls: vec![
                DomainTtl::new("aws.amazon.com", 72),
                DomainTtl::new("amazonaws.com", 72),
                DomainTtl::new("github.com", 48),
                DomainTtl::new("gitlab.com", 48),
                DomainTtl::new("stackoverflow.com", 12),
                DomainTtl::new("stackexchange.com", 12),
            ],
            max_entries: Some(10_000),
        }
    }
}

impl CacheConfig {
    pub fn with_domain_ttl(mut self, suffix: impl Into<String>, hours: u64) -> Self {
        self.domain_ttls.push(DomainTtl::new(suffix, hours));
        self
    }

    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Extra attempts after the first failed extraction.
    pub retry_attempts: u32,
    /// Linear backoff unit: the wait after attempt `n` is `n * retry_base_delay_ms`.
    pub retry_base_delay_ms: u64,
    pub max_description_length: usize,
    pub max_batch_size: usize,
    pub batch_concurrency: usize,
    pub log_preview_cards: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 2,
            retry_base_delay_ms: 1_000,
            max_description_length: 300,
            max_batch_size: 10,
            batch_concurrency: 5,
            log_preview_cards: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    pub fn with_retry_base_delay_ms(mut self, retry_base_delay_ms: u64) -> Self {
        self.retry_base_delay_ms = retry_base_delay_ms;
        self
    }

    pub fn with_batch_concurrency(mut self, batch_concurrency: usize) -> Self {
        self.batch_concurrency = batch_concurrency;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Interval of the background `cleanup_expired` sweep; 0 disables it.
    pub cleanup_interval_secs: u64,
    pub cached_max_age_secs: u64,
    pub fresh_max_age_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            cleanup_interval_secs: 3_600,
            cached_max_age_secs: 3_600,
            fresh_max_age_secs: 300,
        }
    }
}

impl PreviewConfig {
    /// Load configuration from all sources with layered precedence.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("FEED_PREVIEW_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("FEED_PREVIEW_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extractor.timeout_ms == 0 {
            return Err(invalid("extractor.timeout_ms", "must be greater than 0"));
        }
        if self.extractor.max_response_bytes == 0 {
            return Err(invalid("extractor.max_response_bytes", "must be greater than 0"));
        }
        if self.extractor.user_agent.trim().is_empty() {
            return Err(invalid("extractor.user_agent", "must not be empty"));
        }

        let cache = &self.cache;
        if cache.min_ttl_hours == 0 {
            return Err(invalid("cache.min_ttl_hours", "must be at least 1"));
        }
        if !(cache.min_ttl_hours <= cache.default_ttl_hours
            && cache.default_ttl_hours <= cache.max_ttl_hours)
        {
            return Err(invalid(
                "cache.default_ttl_hours",
                "must lie between min_ttl_hours and max_ttl_hours",
            ));
        }
        if let Some(entry) = cache.domain_ttls.iter().find(|d| d.suffix.trim().is_empty()) {
            return Err(invalid(
                "cache.domain_ttls",
                &format!("empty suffix for {} hour entry", entry.hours),
            ));
        }

        let orchestrator = &self.orchestrator;
        if orchestrator.max_batch_size == 0 {
            return Err(invalid("orchestrator.max_batch_size", "must be at least 1"));
        }
        if !(1..=MAX_BATCH_CONCURRENCY).contains(&orchestrator.batch_concurrency) {
            return Err(invalid("orchestrator.batch_concurrency", "must be between 1 and 10"));
        }
        if orchestrator.max_description_length < 4 {
            return Err(invalid(
                "orchestrator.max_description_length",
                "must leave room for the ellipsis marker",
            ));
        }

        Ok(())
    }
}
