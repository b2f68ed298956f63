//! HTTP API over [`PreviewService`].
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /preview` | single preview, `X-Cache` + `Cache-Control` headers |
//! | `POST /preview/batch` | up to `max_batch_size` URLs |
//! | `POST /preview/enhance` | re-run enhancement on a supplied record |
//! | `GET /preview/stats`, `/preview/health`, `/preview/config` | introspection |

use axum::{
    extract::{Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, warn};

use crate::{BatchOptions, PreviewError, PreviewOptions, PreviewRecord, PreviewService};

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

#[derive(Clone)]
pub struct AppState {
    pub service: PreviewService,
}

/// Request-level failure rendered as `{"error": {"code", "message"}}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "PREVIEW_ERROR",
            message: message.into(),
        }
    }
}

impl From<PreviewError> for ApiError {
    fn from(e: PreviewError) -> Self {
        match e {
            PreviewError::InvalidUrl(_) => Self::bad_request("INVALID_URL", e.to_string()),
            PreviewError::InvalidBatch(_) => Self::bad_request("INVALID_URLS", e.to_string()),
            PreviewError::BatchLimitExceeded { .. } => {
                Self::bad_request("TOO_MANY_URLS", e.to_string())
            }
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": { "code": self.code, "message": self.message }
        });
        (self.status, Json(body)).into_response()
    }
}

pub fn create_app(service: PreviewService) -> Router {
    Router::new()
        .route("/preview", get(preview_handler))
        .route("/preview/batch", post(batch_handler))
        .route("/preview/enhance", post(enhance_handler))
        .route("/preview/stats", get(stats_handler))
        .route("/preview/health", get(health_handler))
        .route("/preview/config", get(config_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(AppState { service })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewQuery {
    pub url: Option<String>,
    pub force_refresh: Option<bool>,
    pub enhance: Option<bool>,
}

/// GET /preview?url=...&forceRefresh=...&enhance=...
///
/// Origin failures still answer 200 with an error-shaped record.
async fn preview_handler(
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> Result<Response, ApiError> {
    let url = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("MISSING_URL", "query parameter 'url' is required"))?;
    state.service.validate_url(&url)?;

    let defaults = PreviewOptions::default();
    let options = PreviewOptions {
        force_refresh: query.force_refresh.unwrap_or(defaults.force_refresh),
        enhance: query.enhance.unwrap_or(defaults.enhance),
    };

    let preview = state.service.get_preview(&url, options).await;
    let server = &state.service.config().server;
    let (cache_status, max_age) = if preview.from_cache {
        ("HIT", server.cached_max_age_secs)
    } else {
        ("MISS", server.fresh_max_age_secs)
    };
    debug!(url = %url, cache = cache_status, "Preview served");

    Ok((
        [
            (X_CACHE, cache_status.to_string()),
            (header::CACHE_CONTROL, format!("public, max-age={max_age}")),
        ],
        Json(preview),
    )
        .into_response())
}

/// POST /preview/batch {urls: [...], options?: {...}}
async fn batch_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let urls: Vec<String> = body
        .get("urls")
        .and_then(Value::as_array)
        .and_then(|items| {
            items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| ApiError::bad_request("INVALID_URLS", "'urls' must be an array of strings"))?;

    let options = match body.get("options") {
        None | Some(Value::Null) => BatchOptions::default(),
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
            ApiError::bad_request("INVALID_OPTIONS", format!("invalid batch options: {e}"))
        })?,
    };

    let batch = state.service.get_batch_previews(&urls, options).await?;
    Ok(Json(batch).into_response())
}

/// POST /preview/enhance {preview: {...}}
async fn enhance_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let raw = body
        .get("preview")
        .filter(|p| p.is_object())
        .cloned()
        .ok_or_else(|| {
            ApiError::bad_request("INVALID_PREVIEW_DATA", "'preview' must be an object")
        })?;

    let record: PreviewRecord = serde_json::from_value(raw).map_err(|e| {
        warn!(error = %e, "Rejected preview payload");
        ApiError::bad_request("INVALID_PREVIEW_DATA", e.to_string())
    })?;

    Ok(Json(state.service.enhance(record)).into_response())
}

/// GET /preview/stats
async fn stats_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let cache = state.service.statistics().await?;
    let orchestrator = &state.service.config().orchestrator;
    Ok(Json(json!({
        "cache": cache,
        "orchestrator": orchestrator,
    }))
    .into_response())
}

/// GET /preview/health
async fn health_handler(State(state): State<AppState>) -> Response {
    let report = state.service.health().await;
    let status = match report.status {
        crate::HealthStatus::Healthy => StatusCode::OK,
        crate::HealthStatus::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report)).into_response()
}

/// GET /preview/config
async fn config_handler(State(state): State<AppState>) -> Response {
    Json(state.service.config().clone()).into_response()
}
