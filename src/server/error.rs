//! JSON error responses for the HTTP API.

use crate::fallback::FallbackFailure;
use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No file uploaded")]
    NoFile,
    /// Malformed multipart body, body too large, or the parse timed out.
    #[error("File upload error: {0}")]
    Upload(String),
    #[error("Unsupported image format or corrupted image: {0}")]
    Unsupported(FallbackFailure),
    #[error("Compression failed: {0}")]
    Compression(String),
    #[error("Method not allowed")]
    MethodNotAllowed,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoFile => StatusCode::BAD_REQUEST,
            Self::Unsupported(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Upload(_) | Self::Compression(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            Self::NoFile => json!({ "error": "No file uploaded" }),
            Self::MethodNotAllowed => json!({ "error": "Method not allowed" }),
            Self::Upload(details) => json!({
                "error": "File upload error",
                "details": details,
            }),
            Self::Compression(details) => json!({
                "error": "Compression failed",
                "details": details,
            }),
            Self::Unsupported(failure) => json!({
                "error": "Unsupported image format or corrupted image",
                "details": failure.details(),
                "debug": {
                    "detected": failure.detected,
                    "tmpPath": failure.tmp_path.as_ref().map(|p| p.display().to_string()),
                    "pathError": failure.path_error,
                },
            }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();
        if matches!(self, Self::MethodNotAllowed) {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("POST"));
        }
        response
    }
}
