use crate::blob_store::{content_type_for, BlobStore, BlobStoreError};
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::ingest::FrameIngestor;
use crate::registry::{FrameRecord, LatestFrameRegistry};
use crate::upload::ImageUpload;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

/// Polling page served at `/`
const INDEX_HTML: &str = include_str!("../static/index.html");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<FrameIngestor>,
    pub registry: Arc<LatestFrameRegistry>,
    pub blob_store: Arc<dyn BlobStore>,
    pub image_cache_max_age: Duration,
    pub service_name: String,
}

/// Successful upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub filename: String,
    pub timestamp: i64,
}

/// Latest frame response
#[derive(Debug, Serialize)]
pub struct LatestResponse {
    pub filename: String,
    pub timestamp: i64,
    pub url: String,
}

impl From<FrameRecord> for LatestResponse {
    fn from(record: FrameRecord) -> Self {
        Self {
            url: record.url(),
            filename: record.filename,
            timestamp: record.timestamp,
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<HeaderValue> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/upload", post(upload_image))
        .route("/latest", get(get_latest))
        .route("/images/:filename", get(get_image))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// HTML shell for browser viewers
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.service_name,
        "has_frame": !state.registry.is_empty(),
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.blob_store.is_ready().await {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "storage": "writable"
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "storage": "unavailable"
            })),
        )
    }
}

/// Accept a frame from a camera client
#[instrument(skip_all)]
async fn upload_image(
    State(state): State<AppState>,
    upload: Result<ImageUpload, ApiError>,
) -> Result<Json<UploadResponse>, ApiError> {
    match accept_upload(&state, upload).await {
        Ok((encoding, record)) => {
            metrics::counter!("liveview_uploads_total", "encoding" => encoding).increment(1);

            Ok(Json(UploadResponse {
                status: "success",
                filename: record.filename,
                timestamp: record.timestamp,
            }))
        }
        Err(e) => {
            metrics::counter!("liveview_upload_rejections_total", "reason" => e.code())
                .increment(1);
            Err(e)
        }
    }
}

async fn accept_upload(
    state: &AppState,
    upload: Result<ImageUpload, ApiError>,
) -> Result<(&'static str, FrameRecord), ApiError> {
    let upload = upload?;
    let encoding = upload.encoding();
    let data = upload.into_bytes()?;
    let record = state.ingestor.ingest(data).await?;
    Ok((encoding, record))
}

/// Identity of the most recent frame
async fn get_latest(State(state): State<AppState>) -> Result<Json<LatestResponse>, ApiError> {
    state
        .registry
        .read()
        .map(|record| Json(record.into()))
        .ok_or(ApiError::NoFrameYet)
}

/// Stream stored frame bytes
#[instrument(skip(state))]
async fn get_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let result = state.blob_store.open(&filename).await;

    let outcome = match &result {
        Ok(_) => "hit",
        Err(BlobStoreError::NotFound(_)) => "not_found",
        Err(BlobStoreError::InvalidFilename(_)) => "invalid",
        Err(BlobStoreError::Io(_)) => "error",
    };
    metrics::counter!("liveview_image_requests_total", "outcome" => outcome).increment(1);

    let blob = result?;
    let cache_control = format!(
        "public, max-age={}, immutable",
        state.image_cache_max_age.as_secs()
    );

    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&filename).to_string()),
            (header::CONTENT_LENGTH, blob.size_bytes.to_string()),
            (header::CACHE_CONTROL, cache_control),
        ],
        Body::from_stream(ReaderStream::new(blob.reader)),
    )
        .into_response())
}

/// Start the API server, returning once `shutdown` resolves
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting liveview API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
