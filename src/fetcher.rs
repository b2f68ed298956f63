use crate::config::ExtractorConfig;
use crate::{ExtractOptions, PreviewError};
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, instrument};

/// A successfully retrieved page body.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects.
    pub final_url: String,
    pub body: String,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
}

impl FetchedPage {
    /// Origin marked the response as not storable by shared caches.
    pub fn is_dynamic(&self) -> bool {
        self.cache_control.as_deref().is_some_and(|value| {
            value.split(',').any(|directive| {
                let directive = directive.trim().to_ascii_lowercase();
                directive == "no-store" || directive == "private"
            })
        })
    }
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    timeout: Duration,
    max_response_bytes: usize,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(&ExtractorConfig::default())
    }
}

impl Fetcher {
    pub fn new(config: &ExtractorConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(10))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|e| {
                error!(error = %e, "Failed to create HTTP client with custom config");
                Client::new()
            });
        debug!(timeout_ms = config.timeout_ms, "Fetcher initialized");

        Self::with_client(client, config)
    }

    pub fn with_client(client: Client, config: &ExtractorConfig) -> Self {
        Self {
            client,
            timeout: config.timeout(),
            max_response_bytes: config.max_response_bytes,
        }
    }

    /// Performs exactly one GET, enforcing the timeout and the size ceiling.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn fetch(
        &self,
        url: &str,
        options: ExtractOptions,
    ) -> Result<FetchedPage, PreviewError> {
        let timeout = options
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.timeout);

        let mut request = self.client.get(url).timeout(timeout);
        if options.force_refresh {
            request = request.header(CACHE_CONTROL, "no-cache");
        }

        let mut response = request.send().await.map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PreviewError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let limit = self.max_response_bytes;
        if let Some(declared) = response.content_length() {
            let declared = usize::try_from(declared).unwrap_or(usize::MAX);
            if declared > limit {
                return Err(PreviewError::FetchTooLarge {
                    size: declared,
                    limit,
                });
            }
        }

        let final_url = response.url().to_string();
        let header = |name| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE);
        let cache_control = header(CACHE_CONTROL);

        // Content-Length can be absent or wrong, so count while streaming
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(classify_reqwest_error)? {
            if bytes.len() + chunk.len() > limit {
                return Err(PreviewError::FetchTooLarge {
                    size: bytes.len() + chunk.len(),
                    limit,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!(url = %url, content_length = bytes.len(), "Successfully fetched webpage");

        Ok(FetchedPage {
            final_url,
            body: String::from_utf8_lossy(&bytes).into_owned(),
            content_type,
            cache_control,
        })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> PreviewError {
    if e.is_timeout() {
        PreviewError::FetchTimeout(e.to_string())
    } else if e.is_builder() {
        PreviewError::InvalidUrl(e.to_string())
    } else {
        PreviewError::FetchNetworkError(e.to_string())
    }
}
