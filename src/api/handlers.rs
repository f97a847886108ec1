//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::chart::{ChartRenderer, Variant};
use crate::depth::{Band, DepthDataset, Symbol};
use crate::error::RenderError;

/// Response header carrying the chart caption.
pub const CHART_DESCRIPTION_HEADER: HeaderName = HeaderName::from_static("x-chart-description");

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Set once the first authentication succeeded.
    pub ready: Arc<AtomicBool>,
    /// Dataset fetcher.
    pub datasets: DepthDataset,
    /// Chart renderer.
    pub renderer: ChartRenderer,
    /// Default record limit.
    pub limit: u32,
    /// Prometheus scrape handle, when the recorder is installed.
    pub prometheus: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("ready", &self.is_ready())
            .field("limit", &self.limit)
            .field("prometheus", &self.prometheus.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new app state; not ready until [`authenticate`](Self::authenticate) succeeds.
    pub fn new(datasets: DepthDataset, renderer: ChartRenderer, limit: u32) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            datasets,
            renderer,
            limit,
            prometheus: None,
        }
    }

    /// Attach a Prometheus handle for `/metrics`.
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Obtain a token; marks the service ready on success.
    pub async fn authenticate(&self) -> bool {
        match self.datasets.client().session().authenticate().await {
            Ok(_) => {
                info!("Authenticated with depth API");
                self.set_ready(true);
                true
            }
            Err(e) => {
                warn!(error = %e, "Authentication failed");
                false
            }
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// What went wrong.
    pub error: String,
}

/// Status code plus message, rendered as [`ErrorBody`].
#[derive(Debug)]
pub struct ErrorResponse {
    status: StatusCode,
    message: String,
}

impl ErrorResponse {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<RenderError> for ErrorResponse {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::UnsupportedBand(_) | RenderError::UnsupportedVariant(_) => {
                Self::bad_request(e.to_string())
            }
            RenderError::Task(_) | RenderError::Io(_) => Self::internal(e.to_string()),
            other => Self::new(StatusCode::UNPROCESSABLE_ENTITY, other.to_string()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the service has authenticated.
    pub ready: bool,
}

/// Symbol list response.
#[derive(Debug, Serialize)]
pub struct SymbolsResponse {
    /// Number of symbols.
    pub count: usize,
    /// Symbols in upstream order.
    pub symbols: Vec<String>,
}

/// Depth dataset response.
#[derive(Debug, Serialize)]
pub struct DepthResponse {
    /// Requested symbol, normalized.
    pub symbol: String,
    /// Number of records.
    pub count: usize,
    /// Canonical records.
    pub data: Value,
}

/// `?limit=` on the depth endpoint.
#[derive(Debug, Deserialize)]
pub struct DepthQuery {
    /// Record limit; defaults to the configured one.
    pub limit: Option<u32>,
}

/// `?pct=&variant=` on the chart endpoint.
#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    /// Depth band in percent (1, 3, 5, 8). Defaults to 1.
    pub pct: Option<u8>,
    /// Chart variant (0, 1, 2). Defaults to 0.
    pub variant: Option<u8>,
    /// Record limit; defaults to the configured one.
    pub limit: Option<u32>,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 once authenticated, 503 before.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadyResponse { ready }))
}

/// Available symbols.
pub async fn symbols(State(state): State<AppState>) -> Result<Json<SymbolsResponse>, ErrorResponse> {
    let symbols = state
        .datasets
        .try_fetch_symbols()
        .await
        .map_err(|e| ErrorResponse::new(StatusCode::BAD_GATEWAY, e.to_string()))?;
    Ok(Json(SymbolsResponse {
        count: symbols.len(),
        symbols,
    }))
}

/// Normalized depth dataset for one symbol.
pub async fn depth(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<DepthQuery>,
) -> Result<Json<DepthResponse>, ErrorResponse> {
    let symbol = Symbol::parse(&symbol).map_err(|e| ErrorResponse::bad_request(e.to_string()))?;
    let limit = query.limit.unwrap_or(state.limit);
    let dataset = state
        .datasets
        .fetch_depth(symbol.as_str(), limit)
        .await
        .ok_or_else(|| ErrorResponse::not_found(format!("no depth data for {}", symbol)))?;

    Ok(Json(DepthResponse {
        symbol: symbol.to_string(),
        count: dataset.len(),
        data: dataset.to_json(),
    }))
}

/// Depth chart as PNG. The artifact is deleted before the response leaves.
pub async fn chart(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<ChartQuery>,
) -> Result<Response, ErrorResponse> {
    let band = Band::try_from(query.pct.unwrap_or(1))?;
    let variant = Variant::try_from(query.variant.unwrap_or(0))?;
    let symbol = Symbol::parse(&symbol).map_err(|e| ErrorResponse::bad_request(e.to_string()))?;

    let limit = query.limit.unwrap_or(state.limit);
    let dataset = state
        .datasets
        .fetch_depth(symbol.as_str(), limit)
        .await
        .ok_or_else(|| ErrorResponse::not_found(format!("no depth data for {}", symbol)))?;

    let artifact = state
        .renderer
        .render_blocking(Arc::new(dataset), band, variant)
        .await?;
    let bytes = tokio::fs::read(artifact.path())
        .await
        .map_err(|e| ErrorResponse::internal(format!("reading chart: {}", e)))?;
    let description = HeaderValue::from_str(artifact.description())
        .map_err(|e| ErrorResponse::internal(e.to_string()))?;
    if let Err(e) = artifact.release() {
        warn!(error = %e, "Failed to delete chart artifact");
    }

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
            (CHART_DESCRIPTION_HEADER, description),
        ],
        bytes,
    )
        .into_response())
}

/// Prometheus scrape endpoint; 404 when metrics are disabled.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )],
            handle.render(),
        )
            .into_response(),
        None => ErrorResponse::not_found("metrics are disabled").into_response(),
    }
}
