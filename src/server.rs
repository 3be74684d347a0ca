//! HTTP proxy for the catalog front-end.
//!
//! | Route | Result |
//! |-------|--------|
//! | `GET /api/scrape?url=<page>` | [`VideoMetadata`] as JSON |
//! | `GET /sitemap.xml` | sitemap built from the store |
//! | `GET /health` | liveness probe |
//!
//! Errors are JSON bodies of the form `{"error": "..."}`.

use crate::config::AppConfig;
use crate::fetch::{PageFetcher, TargetError, validate_target};
use crate::models::VideoMetadata;
use crate::scrapers::scrape_url;
use crate::sitemap::build_sitemap;
use crate::store::JsonDirStore;
use crate::utils::BoxError;
use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared handler state.
#[derive(Debug)]
pub struct AppState<F> {
    pub fetcher: F,
    pub store: JsonDirStore,
    pub config: AppConfig,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
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

impl From<TargetError> for ApiError {
    fn from(e: TargetError) -> Self {
        match e {
            TargetError::Invalid(_) => Self::bad_request(e.to_string()),
            TargetError::HostNotAllowed(_) => Self::new(StatusCode::FORBIDDEN, e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct ScrapeParams {
    url: Option<String>,
}

async fn scrape<F>(
    State(state): State<Arc<AppState<F>>>,
    params: Result<Query<ScrapeParams>, QueryRejection>,
) -> ApiResult<Json<VideoMetadata>>
where
    F: PageFetcher + Send + Sync + 'static,
{
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let raw = params
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing url query parameter"))?;
    let url = validate_target(&raw, &state.config.server.allowed_hosts)?;

    match scrape_url(&state.fetcher, &url, &state.config.scraper).await {
        Ok(metadata) => Ok(Json(metadata)),
        Err(e) => {
            warn!(%url, error = %e, "Upstream fetch failed");
            Err(ApiError::new(StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}

async fn sitemap<F>(State(state): State<Arc<AppState<F>>>) -> ApiResult<Response>
where
    F: PageFetcher + Send + Sync + 'static,
{
    let today = Utc::now().date_naive();
    let xml = build_sitemap(&state.config.sitemap, &state.store, today)
        .await
        .map_err(|e: BoxError| {
            error!(error = %e, "Sitemap generation failed");
            ApiError::internal("sitemap generation failed")
        })?;
    Ok(([(header::CONTENT_TYPE, "application/xml; charset=utf-8")], xml).into_response())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn not_found() -> ApiError {
    ApiError::not_found("endpoint not found")
}

/// CORS for the configured origins, or any origin when none are configured.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%origin, error = %e, "Ignoring unusable CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(values))
}

/// Build the proxy router with CORS and request tracing applied.
///
/// # Arguments
///
/// * `state` - Fetcher, store and configuration shared by every handler
///
/// # Returns
///
/// A ready-to-serve [`Router`]. Unknown paths answer a JSON 404.
pub fn create_router<F>(state: AppState<F>) -> Router
where
    F: PageFetcher + Send + Sync + 'static,
{
    let cors = cors_layer(&state.config.server.allowed_origins);
    Router::new()
        .route("/api/scrape", get(scrape::<F>))
        .route("/sitemap.xml", get(sitemap::<F>))
        .route("/health", get(health))
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind to the configured address and serve until Ctrl+C.
///
/// # Returns
///
/// `Ok(())` after a graceful shutdown, or an error if the host is not an IP
/// address or the port cannot be bound.
pub async fn serve<F>(state: AppState<F>) -> Result<(), BoxError>
where
    F: PageFetcher + Send + Sync + 'static,
{
    let host = state.config.server.host.parse::<std::net::IpAddr>()?;
    let addr = SocketAddr::new(host, state.config.server.port);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Proxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    // Only graceful shutdown depends on this; Ctrl+C still ends the process.
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
    }
}
