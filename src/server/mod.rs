//! HTTP surface (axum).
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /` | browser client (embedded single page) |
//! | `POST /api/compress` | multipart upload → re-encoded image |
//! | `GET /api/presets` | size and quality presets for the client |
//! | `GET /api/formats` | decodable inputs, encodable outputs, converter |
//! | `GET /healthz` | liveness |
//!
//! Image work is CPU-bound and runs on tokio's blocking pool; the async side
//! only receives the form and writes the response.

mod error;
mod routes;
pub mod upload;

pub use error::ApiError;

use crate::compress::CompressSettings;
use crate::config::AppConfig;
use crate::convert::Converter;
use crate::imaging::{ImageBackend, Quality, RustBackend};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::sync::Arc;
use std::time::Duration;

/// Everything a request handler needs.
pub struct AppState {
    pub backend: Arc<dyn ImageBackend + Send + Sync>,
    pub converter: Arc<dyn Converter + Send + Sync>,
    pub settings: CompressSettings,
    pub default_quality: Quality,
    pub parse_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Production state: pure-Rust backend plus whatever converter the host has.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(RustBackend::new()),
            Arc::new(config.detect_converter()),
        )
    }

    pub fn with_parts(
        config: &AppConfig,
        backend: Arc<dyn ImageBackend + Send + Sync>,
        converter: Arc<dyn Converter + Send + Sync>,
    ) -> Self {
        Self {
            backend,
            converter,
            settings: config.compress_settings(),
            default_quality: config.default_quality(),
            parse_timeout: config.server.parse_timeout(),
            max_upload_bytes: config.server.max_upload_bytes,
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(routes::index))
        .route(
            "/api/compress",
            post(routes::compress_upload).fallback(routes::method_not_allowed),
        )
        .route("/api/presets", get(routes::presets))
        .route("/api/formats", get(routes::formats))
        .route("/healthz", get(routes::healthz))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(Arc::new(state))
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: &AppConfig) -> anyhow::Result<()> {
    let app = router(AppState::from_config(config));

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
