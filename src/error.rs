use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request timed out: {0}")]
    FetchTimeout(String),

    #[error("Failed to fetch content: {0}")]
    FetchNetworkError(String),

    #[error("Origin returned HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Response too large: {size} bytes exceeds limit of {limit} bytes")]
    FetchTooLarge { size: usize, limit: usize },

    #[error("Failed to parse content: {0}")]
    ParseError(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Too many URLs: {count} exceeds maximum of {max}")]
    BatchLimitExceeded { count: usize, max: usize },

    #[error("Invalid batch request: {0}")]
    InvalidBatch(String),
}

impl From<url::ParseError> for PreviewError {
    fn from(e: url::ParseError) -> Self {
        PreviewError::InvalidUrl(e.to_string())
    }
}

impl PreviewError {
    /// Whether another attempt against the same origin could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            PreviewError::InvalidUrl(_)
            | PreviewError::FetchTooLarge { .. }
            | PreviewError::BatchLimitExceeded { .. }
            | PreviewError::InvalidBatch(_) => false,
            PreviewError::HttpStatus { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            _ => true,
        }
    }

    pub fn log(&self) {
        match self {
            PreviewError::InvalidUrl(e) => {
                warn!(error = %e, "URL validation failed");
            }
            PreviewError::FetchTimeout(e) => {
                warn!(error = %e, "Request timed out");
            }
            PreviewError::FetchNetworkError(e) => {
                error!(error = %e, "Content fetch failed");
            }
            PreviewError::HttpStatus { status, url } => {
                warn!(status = %status, url = %url, "Origin returned error status");
            }
            PreviewError::FetchTooLarge { size, limit } => {
                warn!(size = %size, limit = %limit, "Response exceeded size ceiling");
            }
            PreviewError::ParseError(e) => {
                error!(error = %e, "Metadata extraction failed");
            }
            PreviewError::CacheUnavailable(e) => {
                warn!(error = %e, "Cache operation failed");
            }
            PreviewError::BatchLimitExceeded { count, max } => {
                warn!(count = %count, max = %max, "Batch size limit exceeded");
            }
            PreviewError::InvalidBatch(e) => {
                warn!(error = %e, "Invalid batch request");
            }
        }
    }
}
