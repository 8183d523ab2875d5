//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the [`compress`](crate::compress) pipeline (which decides
//! how an upload should be normalized) and the [`backend`](super::backend)
//! (which does the actual pixel work). This separation allows swapping backends
//! (e.g. for testing with a mock) without changing pipeline logic.
//!
//! ## Types
//!
//! - [`Quality`] — Lossy encoding quality (1–100, default 70). Clamped on construction.
//! - [`Bounds`] — Optional max width / max height for a fit-inside resize.
//! - [`SourceFormat`] — What the upload turned out to be.
//! - [`OutputFormat`] / [`FormatChoice`] — What to re-encode to.
//! - [`EncodeParams`] — Full specification for an encode: format + quality.

use serde::Serialize;
use std::fmt;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    /// Build from a possibly-negative request value.
    pub fn from_signed(value: i64) -> Self {
        Self(value.clamp(1, 100) as u32)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(70)
    }
}

/// Maximum output dimensions. `None` on an axis means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bounds {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

impl Bounds {
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Same limit on both axes; 0 means no resize.
    pub fn square(max: u32) -> Self {
        Self::new(max, max)
    }

    /// Build from raw values where 0 means unlimited.
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width: (max_width > 0).then_some(max_width),
            max_height: (max_height > 0).then_some(max_height),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_width.is_none() && self.max_height.is_none()
    }
}

/// The format an upload was identified as by whichever decode tier succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
    Tiff,
    Bmp,
    Avif,
    Heif,
    Other(String),
}

impl SourceFormat {
    pub fn from_image_format(format: image::ImageFormat) -> Self {
        use image::ImageFormat as F;
        match format {
            F::Jpeg => Self::Jpeg,
            F::Png => Self::Png,
            F::Gif => Self::Gif,
            F::WebP => Self::WebP,
            F::Tiff => Self::Tiff,
            F::Bmp => Self::Bmp,
            F::Avif => Self::Avif,
            other => Self::Other(format!("{other:?}").to_lowercase()),
        }
    }

    /// Map a sniffed file extension back to a source format.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "gif" => Self::Gif,
            "webp" => Self::WebP,
            "tif" | "tiff" => Self::Tiff,
            "bmp" => Self::Bmp,
            "avif" => Self::Avif,
            "heic" | "heif" => Self::Heif,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
            Self::Avif => "avif",
            Self::Heif => "heif",
            Self::Other(name) => name,
        };
        f.write_str(name)
    }
}

/// Encodable output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    WebP,
    Png,
    Avif,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [Self::Jpeg, Self::WebP, Self::Png, Self::Avif];

    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
            Self::Png => "image/png",
            Self::Avif => "image/avif",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
            Self::Png => "png",
            Self::Avif => "avif",
        }
    }
}

/// Requested output format: pick automatically, or force one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormatChoice {
    #[default]
    Auto,
    Explicit(OutputFormat),
}

impl FormatChoice {
    /// Parse a user-supplied name. Unknown names fall back to [`FormatChoice::Auto`].
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Self::Explicit(OutputFormat::Jpeg),
            "webp" => Self::Explicit(OutputFormat::WebP),
            "png" => Self::Explicit(OutputFormat::Png),
            "avif" => Self::Explicit(OutputFormat::Avif),
            _ => Self::Auto,
        }
    }
}

/// Parameters for a single encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub format: OutputFormat,
    pub quality: Quality,
}
