//! The normalization pipeline: decode (with fallbacks), auto-rotate, resize,
//! re-encode.
//!
//! ```text
//! upload bytes
//!   → fallback chain      (buffer → path → convert)
//!   → EXIF orientation    (pixels rotated, tag dropped)
//!   → fit inside bounds   (Lanczos3, never upscaled unless allowed)
//!   → encode              (auto or requested format, at quality)
//! ```
//!
//! Everything here is synchronous and CPU-bound. The HTTP layer runs it on
//! tokio's blocking pool; the CLI runs it on rayon.

use crate::convert::Converter;
use crate::fallback::{FallbackFailure, FallbackOptions, Tier, decode_with_fallback};
use crate::imaging::rust_backend::resize;
use crate::imaging::{
    BackendError, Bounds, EncodeParams, FormatChoice, ImageBackend, OutputFormat, Quality,
    SourceFormat, apply_orientation, choose_output_format, fit_inside,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressError {
    /// No tier could decode the upload.
    #[error("Unsupported image: {0}")]
    Unsupported(#[from] FallbackFailure),
    #[error("Encode failed: {0}")]
    Encode(#[source] BackendError),
}

/// Pipeline settings that come from config rather than the request.
#[derive(Debug, Clone, Default)]
pub struct CompressSettings {
    pub fallback: FallbackOptions,
    pub allow_upscale: bool,
}

/// One compression job.
#[derive(Debug, Clone, Copy)]
pub struct CompressRequest<'a> {
    pub bytes: &'a [u8],
    pub quality: Quality,
    pub bounds: Bounds,
    pub format: FormatChoice,
}

impl<'a> CompressRequest<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            quality: Quality::default(),
            bounds: Bounds::unlimited(),
            format: FormatChoice::Auto,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompressOutput {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    /// Size of the upload in bytes.
    pub original_size: usize,
    pub tier: Tier,
    pub source_format: SourceFormat,
}

impl CompressOutput {
    /// Percentage saved relative to the upload. Negative when the output grew.
    pub fn savings_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (1.0 - self.bytes.len() as f64 / self.original_size as f64) * 100.0
    }
}

/// Run the full pipeline over one upload.
pub fn compress(
    backend: &dyn ImageBackend,
    converter: &dyn Converter,
    settings: &CompressSettings,
    request: CompressRequest<'_>,
) -> Result<CompressOutput, CompressError> {
    let decoded = decode_with_fallback(backend, converter, request.bytes, &settings.fallback)?;
    let tier = decoded.tier;
    let has_alpha = decoded.image.has_alpha();
    let source_format = decoded.image.source_format.clone();
    let orientation = decoded.image.orientation;

    let mut image = apply_orientation(decoded.image.image, orientation);

    if !request.bounds.is_unlimited() {
        let (width, height) = fit_inside(
            (image.width(), image.height()),
            request.bounds,
            settings.allow_upscale,
        );
        image = resize(&image, width, height);
    }

    let format = choose_output_format(&source_format, has_alpha, request.format);
    let params = EncodeParams {
        format,
        quality: request.quality,
    };
    let bytes = backend
        .encode(&image, &params)
        .map_err(CompressError::Encode)?;

    tracing::debug!(
        tier = %tier,
        source = %source_format,
        output = ?format,
        width = image.width(),
        height = image.height(),
        orientation = orientation.0,
        in_bytes = request.bytes.len(),
        out_bytes = bytes.len(),
        "compressed"
    );

    Ok(CompressOutput {
        bytes,
        format,
        width: image.width(),
        height: image.height(),
        original_size: request.bytes.len(),
        tier,
        source_format,
    })
}
