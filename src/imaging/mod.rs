//! Image processing: decode, orient, resize, encode.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (+ `rav1d` for AVIF input) |
//! | **Sniff** | `image::guess_format` + ISO-BMFF brand check |
//! | **Auto-rotate** | `kamadak-exif` orientation tag → flips/rotations |
//! | **Resize** | fit-inside math + Lanczos3 |
//! | **Encode** | JPEG / WebP / PNG / AVIF at a quality |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math and format choice (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Sniff / Orientation**: helpers the backend and fallback chain share
//! - **AVIF**: rav1d-based AVIF decoding, alpha included

mod avif;
pub mod backend;
mod calculations;
pub mod orientation;
mod params;
pub mod rust_backend;
pub mod sniff;

pub use backend::{BackendError, DecodedImage, ImageBackend};
pub use calculations::{choose_output_format, fit_inside};
pub use orientation::{Orientation, apply_orientation};
pub use params::{Bounds, EncodeParams, FormatChoice, OutputFormat, Quality, SourceFormat};
pub use rust_backend::{RustBackend, supported_input_formats};
pub use sniff::{Detected, sniff};
