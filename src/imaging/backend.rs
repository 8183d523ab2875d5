//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations the pipeline needs:
//! decode from memory, decode from a file, and encode. Everything the
//! [fallback chain](crate::fallback) and [pipeline](crate::compress) do is
//! written against this trait.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::orientation::Orientation;
use super::params::{EncodeParams, OutputFormat, SourceFormat};
use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode {source_desc}: {message}")]
    Decode {
        source_desc: String,
        message: String,
    },
    #[error("{format:?} encode failed: {message}")]
    Encode {
        format: OutputFormat,
        message: String,
    },
}

impl BackendError {
    pub(crate) fn decode(source_desc: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            source_desc: source_desc.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn encode(format: OutputFormat, message: impl ToString) -> Self {
        Self::Encode {
            format,
            message: message.to_string(),
        }
    }
}

/// A successfully decoded upload, before any normalization.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub source_format: SourceFormat,
    /// EXIF orientation found in the decoded bytes (not yet applied).
    pub orientation: Orientation,
}

impl DecodedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    pub fn has_alpha(&self) -> bool {
        self.image.color().has_alpha()
    }
}

/// Trait for image processing backends.
pub trait ImageBackend: Sync {
    /// Decode an in-memory buffer, sniffing the format from its content.
    fn decode_bytes(&self, bytes: &[u8]) -> Result<DecodedImage, BackendError>;

    /// Decode a file on disk, using its extension as the format hint.
    fn decode_path(&self, path: &Path) -> Result<DecodedImage, BackendError>;

    /// Encode pixels into the requested format.
    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, BackendError>;
}
