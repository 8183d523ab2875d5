use super::AppState;
use super::error::ApiError;
use super::upload::{UploadForm, read_form};
use crate::compress::{CompressError, CompressRequest, compress};
use crate::imaging::{OutputFormat, supported_input_formats};
use crate::presets::{PresetCatalog, catalog};
use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::{HeaderName, HeaderValue, header};
use axum::response::{Html, IntoResponse, Response};
use serde::Serialize;
use std::sync::Arc;

const INDEX_HTML: &str = include_str!("../../static/index.html");

pub const DECODE_TIER_HEADER: HeaderName = HeaderName::from_static("x-decode-tier");
pub const ORIGINAL_SIZE_HEADER: HeaderName = HeaderName::from_static("x-original-size");

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn presets() -> Json<PresetCatalog> {
    Json(catalog())
}

#[derive(Serialize)]
struct OutputEntry {
    id: OutputFormat,
    mime: &'static str,
    extension: &'static str,
}

#[derive(Serialize)]
pub struct FormatsReport {
    inputs: &'static [&'static str],
    outputs: Vec<OutputEntry>,
    converter: Option<&'static str>,
    disk_fallback: bool,
}

pub async fn formats(State(state): State<Arc<AppState>>) -> Json<FormatsReport> {
    Json(FormatsReport {
        inputs: supported_input_formats(),
        outputs: OutputFormat::ALL
            .iter()
            .map(|&f| OutputEntry {
                id: f,
                mime: f.mime(),
                extension: f.extension(),
            })
            .collect(),
        converter: state.converter.tool().map(|t| t.binary()),
        disk_fallback: state.settings.fallback.disk,
    })
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

pub async fn compress_upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let multipart = multipart.map_err(|rejection| {
        tracing::debug!(%rejection, "request is not a multipart form");
        ApiError::NoFile
    })?;

    let form: UploadForm = tokio::time::timeout(state.parse_timeout, read_form(multipart))
        .await
        .map_err(|_| {
            tracing::warn!(timeout = ?state.parse_timeout, "upload parse timed out");
            ApiError::Upload("Upload timed out".into())
        })?
        .map_err(|e| {
            tracing::warn!(error = %e, "multipart parse failed");
            ApiError::Upload(e.body_text())
        })?;

    let quality = form.quality(state.default_quality);
    let bounds = form.bounds();
    let format = form.format();
    let Some(file) = form.file else {
        tracing::info!("upload without a file");
        return Err(ApiError::NoFile);
    };

    tracing::info!(
        quality = quality.value(),
        max_width = ?bounds.max_width,
        max_height = ?bounds.max_height,
        format = ?format,
        file = file.file_name.as_deref().unwrap_or("<unnamed>"),
        mime = file.content_type.as_deref().unwrap_or("<none>"),
        size = file.bytes.len(),
        "compress request"
    );

    let stem = file.stem();
    let worker = state.clone();
    let bytes = file.bytes;
    let result = tokio::task::spawn_blocking(move || {
        let request = CompressRequest {
            bytes: &bytes,
            quality,
            bounds,
            format,
        };
        compress(
            worker.backend.as_ref(),
            worker.converter.as_ref(),
            &worker.settings,
            request,
        )
    })
    .await
    .map_err(|e| ApiError::Compression(format!("worker failed: {e}")))?;

    let output = match result {
        Ok(output) => output,
        Err(CompressError::Unsupported(failure)) => {
            tracing::warn!(
                error = %failure,
                detected = ?failure.detected,
                path_error = failure.path_error.as_deref().unwrap_or(""),
                "all decode tiers failed"
            );
            return Err(ApiError::Unsupported(failure));
        }
        Err(e @ CompressError::Encode(_)) => {
            tracing::error!(error = %e, "compression failed");
            return Err(ApiError::Compression(e.to_string()));
        }
    };

    tracing::info!(
        tier = %output.tier,
        source = %output.source_format,
        output = output.format.extension(),
        width = output.width,
        height = output.height,
        original_size = output.original_size,
        compressed_size = output.bytes.len(),
        savings_pct = output.savings_percent().round(),
        "compressed upload"
    );

    let disposition = HeaderValue::from_str(&format!(
        "inline; filename=\"{stem}.{}\"",
        output.format.extension()
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("inline"));

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(output.format.mime())),
            (header::CONTENT_DISPOSITION, disposition),
            (DECODE_TIER_HEADER, HeaderValue::from_static(output.tier.as_str())),
            (ORIGINAL_SIZE_HEADER, HeaderValue::from(output.original_size)),
        ],
        output.bytes,
    )
        .into_response())
}
