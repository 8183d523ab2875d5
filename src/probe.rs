//! Decode diagnostics for a single file (`probe` command).
//!
//! Runs the buffer and path decoders independently, without the fallback
//! chain short-circuiting, so you can see which one copes with a problem file
//! and what the sniffer thinks it is.

use crate::convert::Converter;
use crate::imaging::{BackendError, DecodedImage, Detected, ImageBackend, sniff};
use std::path::{Path, PathBuf};

/// What one decoder made of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeSummary {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub has_alpha: bool,
    pub orientation: u32,
}

impl From<&DecodedImage> for DecodeSummary {
    fn from(decoded: &DecodedImage) -> Self {
        let (width, height) = decoded.dimensions();
        Self {
            width,
            height,
            format: decoded.source_format.to_string(),
            has_alpha: decoded.has_alpha(),
            orientation: decoded.orientation.0,
        }
    }
}

#[derive(Debug)]
pub struct ProbeReport {
    pub path: PathBuf,
    pub size: usize,
    pub detected: Option<Detected>,
    pub buffer: Result<DecodeSummary, String>,
    pub path_decode: Result<DecodeSummary, String>,
    pub converter: Option<&'static str>,
}

fn summarize(result: Result<DecodedImage, BackendError>) -> Result<DecodeSummary, String> {
    result
        .as_ref()
        .map(DecodeSummary::from)
        .map_err(|e| e.to_string())
}

/// Probe `path` with both decode strategies.
pub fn probe(
    backend: &dyn ImageBackend,
    converter: &dyn Converter,
    path: &Path,
) -> std::io::Result<ProbeReport> {
    let bytes = std::fs::read(path)?;
    Ok(ProbeReport {
        path: path.to_path_buf(),
        size: bytes.len(),
        detected: sniff(&bytes),
        buffer: summarize(backend.decode_bytes(&bytes)),
        path_decode: summarize(backend.decode_path(path)),
        converter: converter.tool().map(|t| t.binary()),
    })
}
