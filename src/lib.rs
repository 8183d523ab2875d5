//! # Image Compressor
//!
//! Upload an image, get it back upright, resized and re-encoded. One pipeline
//! serves both the HTTP endpoint (with its embedded browser client) and the
//! `compress` CLI command.
//!
//! # Pipeline
//!
//! ```text
//! 1. Decode    bytes  →  pixels      (buffer → temp file → external converter)
//! 2. Rotate    pixels →  upright     (EXIF orientation applied, tag dropped)
//! 3. Resize    upright → bounded     (fit inside max width/height, Lanczos3)
//! 4. Encode    bounded → bytes       (JPEG, or WebP when the source has alpha)
//! ```
//!
//! Each stage is a plain function over owned data, so tests can drive the
//! whole pipeline through a [`imaging::ImageBackend`] mock without encoding
//! real images or touching the filesystem.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Pure-Rust decode/resize/encode, format sniffing, EXIF orientation |
//! | [`convert`] | External CLI conversion (`sips`, `magick`, `heif-convert`) to PNG |
//! | [`fallback`] | The tiered decoder: buffer, then temp-file path, then converter |
//! | [`compress`] | The full pipeline for one upload |
//! | [`presets`] | Named size and quality presets shared by CLI and browser client |
//! | [`server`] | axum router, multipart handling, error responses |
//! | [`process`] | Parallel batch compression of local files |
//! | [`probe`] | Per-decoder diagnostics for a problem file |
//! | [`config`] | `compressor.toml` loading, validation and `API_PORT` override |
//! | [`logging`] | tracing subscriber setup |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Tiered Decoding
//!
//! Phone uploads are the hard case: HEIC from iPhones, JPEGs with odd markers,
//! files whose extension lies about their content. Rather than fail on the
//! first decoder error, [`fallback::decode_with_fallback`] tries progressively
//! heavier strategies and reports which one worked (`X-Decode-Tier`). When all
//! of them fail, the 415 response carries the sniffed type and every error seen
//! along the way so a bad upload can be diagnosed from the browser.
//!
//! ## Shell Out Only For What Rust Can't Read
//!
//! Everything except HEIC/HEIF decodes in-process with the `image` crate. The
//! converter tier exists for the formats that need a platform codec, and it is
//! skipped silently when no tool is installed.

pub mod compress;
pub mod config;
pub mod convert;
pub mod fallback;
pub mod imaging;
pub mod logging;
pub mod output;
pub mod presets;
pub mod probe;
pub mod process;
pub mod server;
