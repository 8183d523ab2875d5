//! The tiered decode chain.
//!
//! Uploads are decoded by trying progressively heavier strategies until one
//! works:
//!
//! 1. **Buffer**: decode straight from memory.
//! 2. **Path**: write the upload to `upload-<random>.<ext>` in the temp dir
//!    (extension from the sniffed container) and decode from disk.
//! 3. **Convert**: hand the temp file to an external tool
//!    ([`crate::convert`]) that writes `<temp>.converted.png`, then decode
//!    that PNG.
//!
//! When everything fails, [`FallbackFailure`] carries enough context for the
//! 415 response: the first error, the sniffed type, the temp path (if kept)
//! and the accumulated path/convert errors.

use crate::convert::Converter;
use crate::imaging::{DecodedImage, Detected, ImageBackend, SourceFormat, sniff};
use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use thiserror::Error;

/// Which strategy produced the decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Buffer,
    Path,
    Convert,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buffer => "buffer",
            Self::Path => "path",
            Self::Convert => "convert",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knobs from the `[fallback]` config section.
#[derive(Debug, Clone, Default)]
pub struct FallbackOptions {
    /// Try the disk tiers at all.
    pub disk: bool,
    /// Where temp files go. `None` = system temp dir.
    pub temp_dir: Option<PathBuf>,
    /// Leave temp files behind for inspection.
    pub keep_temp_files: bool,
}

/// A successful decode and how it was reached.
#[derive(Debug)]
pub struct Decoded {
    pub image: DecodedImage,
    pub tier: Tier,
    pub detected: Option<Detected>,
}

/// Every tier failed.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct FallbackFailure {
    /// Error from the buffer tier.
    pub message: String,
    pub detected: Option<Detected>,
    /// Temp file, only reported when it was kept on disk.
    pub tmp_path: Option<PathBuf>,
    /// `"<path error> | convert: <error>"` and so on.
    pub path_error: Option<String>,
}

impl FallbackFailure {
    /// Human-readable summary for the `details` field of the 415 body.
    pub fn details(&self) -> String {
        match &self.detected {
            Some(d) => format!("Detected {} ({}) - {}", d.mime, d.ext, self.message),
            None => self.message.clone(),
        }
    }

    fn push_path_error(&mut self, label: &str, err: impl fmt::Display) {
        self.path_error = Some(match self.path_error.take() {
            Some(prev) => format!("{prev} | {label}: {err}"),
            None => format!("{label}: {err}"),
        });
    }
}

/// Run the decode chain over an uploaded buffer.
pub fn decode_with_fallback(
    backend: &dyn ImageBackend,
    converter: &dyn Converter,
    bytes: &[u8],
    options: &FallbackOptions,
) -> Result<Decoded, FallbackFailure> {
    let detected = sniff(bytes);

    let buffer_err = match backend.decode_bytes(bytes) {
        Ok(image) => {
            return Ok(Decoded {
                image,
                tier: Tier::Buffer,
                detected,
            });
        }
        Err(e) => e,
    };
    tracing::debug!(error = %buffer_err, detected = ?detected, "buffer decode failed");

    let mut failure = FallbackFailure {
        message: buffer_err.to_string(),
        detected: detected.clone(),
        tmp_path: None,
        path_error: None,
    };

    if !options.disk {
        return Err(failure);
    }

    let ext = detected.as_ref().map_or("bin", |d| d.ext.as_str());
    let temp = match write_temp_file(bytes, ext, options.temp_dir.as_deref()) {
        Ok(temp) => temp,
        Err(e) => {
            failure.push_path_error("temp file", e);
            return Err(failure);
        }
    };
    tracing::debug!(path = %temp.display(), "wrote upload to temp file");

    let outcome = disk_tiers(backend, converter, &temp, options, &mut failure);
    let kept = finish_temp(temp, options.keep_temp_files);

    match outcome {
        Some((mut image, tier)) => {
            // The pixels came from a PNG we made; report what was uploaded.
            if let (Tier::Convert, Some(d)) = (tier, &detected) {
                image.source_format = SourceFormat::from_extension(&d.ext);
            }
            Ok(Decoded {
                image,
                tier,
                detected,
            })
        }
        None => {
            failure.tmp_path = kept;
            Err(failure)
        }
    }
}

/// Tiers 2–4. Records errors into `failure` as it goes.
fn disk_tiers(
    backend: &dyn ImageBackend,
    converter: &dyn Converter,
    path: &Path,
    options: &FallbackOptions,
    failure: &mut FallbackFailure,
) -> Option<(DecodedImage, Tier)> {
    match backend.decode_path(path) {
        Ok(image) => return Some((image, Tier::Path)),
        Err(e) => {
            tracing::debug!(error = %e, "path decode failed");
            failure.path_error = Some(e.to_string());
        }
    }

    let Some(tool) = converter.tool() else {
        tracing::debug!("no conversion tool, giving up");
        return None;
    };

    let converted = converted_path(path);
    if let Err(e) = converter.convert_to_png(path, &converted) {
        tracing::debug!(tool = tool.binary(), error = %e, "conversion failed");
        failure.push_path_error("convert", e);
        finish_temp(TempPath::from_path(&converted), options.keep_temp_files);
        return None;
    }
    let converted = TempPath::from_path(converted);

    let result = std::fs::read(&converted)
        .map_err(crate::imaging::BackendError::from)
        .and_then(|png| backend.decode_bytes(&png));
    finish_temp(converted, options.keep_temp_files);

    match result {
        Ok(image) => {
            tracing::debug!(tool = tool.binary(), "decoded converted output");
            Some((image, Tier::Convert))
        }
        Err(e) => {
            failure.push_path_error("convert+decode", e);
            None
        }
    }
}

fn write_temp_file(bytes: &[u8], ext: &str, dir: Option<&Path>) -> std::io::Result<TempPath> {
    let suffix = format!(".{ext}");
    let mut builder = tempfile::Builder::new();
    builder.prefix("upload-").suffix(&suffix);
    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file.into_temp_path())
}

/// `<path>.converted.png`
fn converted_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".converted.png");
    PathBuf::from(name)
}

/// Delete the file, or keep it and return where it lives.
fn finish_temp(temp: TempPath, keep: bool) -> Option<PathBuf> {
    if !keep {
        // Dropping removes it; a missing file is fine.
        drop(temp);
        return None;
    }
    match temp.keep() {
        Ok(path) if path.exists() => Some(path),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "could not keep temp file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::tests::MockConverter;
    use crate::imaging::backend::tests::{MockBackend, MockDecode, RecordedOp};

    const HEIC_HEADER: &[u8] = &[
        0, 0, 0, 24, b'f', b't', b'y', b'p', b'h', b'e', b'i', b'c', 0, 0, 0, 0, b'm', b'i', b'f',
        b'1', b'h', b'e', b'i', b'c', 0, 0, 0, 8,
    ];

    fn options(dir: &Path, keep: bool) -> FallbackOptions {
        FallbackOptions {
            disk: true,
            temp_dir: Some(dir.to_path_buf()),
            keep_temp_files: keep,
        }
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn buffer_success_touches_no_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend =
            MockBackend::with_results(vec![MockDecode::rgb(10, 10, SourceFormat::Jpeg)], vec![]);
        let converter = MockConverter::unavailable();

        let decoded =
            decode_with_fallback(&backend, &converter, b"jpeg", &options(tmp.path(), false))
                .unwrap();

        assert_eq!(decoded.tier, Tier::Buffer);
        assert_eq!(backend.get_operations(), vec![RecordedOp::DecodeBytes(4)]);
        assert!(dir_entries(tmp.path()).is_empty());
    }

    #[test]
    fn path_tier_uses_sniffed_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = MockBackend::with_results(
            vec![MockDecode::fail("buffer")],
            vec![MockDecode::rgb(4, 4, SourceFormat::Heif)],
        );
        let converter = MockConverter::unavailable();

        let decoded =
            decode_with_fallback(&backend, &converter, HEIC_HEADER, &options(tmp.path(), false))
                .unwrap();

        assert_eq!(decoded.tier, Tier::Path);
        let ops = backend.get_operations();
        let RecordedOp::DecodePath(path) = &ops[1] else {
            panic!("expected path decode, got {ops:?}");
        };
        let name = Path::new(path).file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("upload-"), "{name}");
        assert!(name.ends_with(".heic"), "{name}");
        // removed afterwards
        assert!(dir_entries(tmp.path()).is_empty());
    }

    #[test]
    fn unknown_content_gets_bin_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = MockBackend::with_results(vec![MockDecode::fail("buffer")], vec![]);
        let converter = MockConverter::unavailable();

        let failure =
            decode_with_fallback(&backend, &converter, b"garbage", &options(tmp.path(), true))
                .unwrap_err();

        let kept = failure.tmp_path.unwrap();
        assert!(kept.to_string_lossy().ends_with(".bin"));
        assert_eq!(std::fs::read(&kept).unwrap(), b"garbage");
    }

    #[test]
    fn convert_tier_reports_original_format() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = MockBackend::with_results(
            vec![
                MockDecode::fail("buffer"),
                MockDecode::rgb(6, 3, SourceFormat::Png),
            ],
            vec![MockDecode::fail("unsupported")],
        );
        let converter = MockConverter::writing(b"fake png".to_vec());

        let decoded =
            decode_with_fallback(&backend, &converter, HEIC_HEADER, &options(tmp.path(), false))
                .unwrap();

        assert_eq!(decoded.tier, Tier::Convert);
        assert_eq!(decoded.image.source_format, SourceFormat::Heif);
        assert_eq!(
            decoded.detected.as_ref().map(|d| d.mime.as_str()),
            Some("image/heic")
        );

        let calls = converter.calls.lock().unwrap();
        let (input, output) = &calls[0];
        assert_eq!(
            output.to_string_lossy(),
            format!("{}.converted.png", input.to_string_lossy())
        );
        assert_eq!(
            backend.get_operations().last(),
            Some(&RecordedOp::DecodeBytes(b"fake png".len()))
        );
        assert!(dir_entries(tmp.path()).is_empty());
    }

    #[test]
    fn failure_accumulates_every_tier() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = MockBackend::with_results(
            vec![MockDecode::fail("bad buffer"), MockDecode::fail("bad png")],
            vec![MockDecode::fail("bad path")],
        );
        let converter = MockConverter::writing(b"not really png".to_vec());

        let failure =
            decode_with_fallback(&backend, &converter, HEIC_HEADER, &options(tmp.path(), false))
                .unwrap_err();

        assert_eq!(failure.message, "Failed to decode buffer: bad buffer");
        let path_error = failure.path_error.unwrap();
        assert!(path_error.contains("bad path"), "{path_error}");
        assert!(
            path_error.contains(" | convert+decode: Failed to decode buffer: bad png"),
            "{path_error}"
        );
        assert_eq!(failure.tmp_path, None);
        assert!(dir_entries(tmp.path()).is_empty());
    }

    #[test]
    fn convert_error_is_appended() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = MockBackend::with_results(
            vec![MockDecode::fail("bad buffer")],
            vec![MockDecode::fail("bad path")],
        );

        struct Broken;
        impl Converter for Broken {
            fn tool(&self) -> Option<crate::convert::ConvertTool> {
                Some(crate::convert::ConvertTool::Magick)
            }
            fn convert_to_png(
                &self,
                _: &Path,
                _: &Path,
            ) -> Result<(), crate::convert::ConvertError> {
                Err(crate::convert::ConvertError::Failed {
                    tool: "magick",
                    status: "exit status: 1".into(),
                    stderr: "no decode delegate".into(),
                })
            }
        }

        let failure =
            decode_with_fallback(&backend, &Broken, HEIC_HEADER, &options(tmp.path(), false))
                .unwrap_err();

        let path_error = failure.path_error.unwrap();
        assert!(
            path_error.ends_with(" | convert: magick exited with exit status: 1: no decode delegate"),
            "{path_error}"
        );
    }

    #[test]
    fn disk_disabled_stops_after_buffer() {
        let backend = MockBackend::with_results(vec![MockDecode::fail("nope")], vec![]);
        let converter = MockConverter::writing(Vec::new());
        let opts = FallbackOptions {
            disk: false,
            ..Default::default()
        };

        let failure = decode_with_fallback(&backend, &converter, HEIC_HEADER, &opts).unwrap_err();

        assert_eq!(backend.get_operations().len(), 1);
        assert!(failure.path_error.is_none());
        assert!(converter.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn details_mentions_detected_type() {
        let failure = FallbackFailure {
            message: "boom".into(),
            detected: sniff(HEIC_HEADER),
            tmp_path: None,
            path_error: None,
        };
        assert_eq!(failure.details(), "Detected image/heic (heic) - boom");

        let bare = FallbackFailure {
            detected: None,
            ..failure
        };
        assert_eq!(bare.details(), "boom");
    }

    #[test]
    fn kept_files_include_converted_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = MockBackend::with_results(
            vec![MockDecode::fail("buffer"), MockDecode::fail("png")],
            vec![MockDecode::fail("path")],
        );
        let converter = MockConverter::writing(b"x".to_vec());

        let failure =
            decode_with_fallback(&backend, &converter, HEIC_HEADER, &options(tmp.path(), true))
                .unwrap_err();

        let entries = dir_entries(tmp.path());
        assert_eq!(entries.len(), 2, "{entries:?}");
        assert!(entries.iter().any(|e| e.ends_with(".heic.converted.png")));
        assert!(failure.tmp_path.unwrap().exists());
    }
}
