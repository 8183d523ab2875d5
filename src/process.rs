//! Batch compression of local files for the `compress` command.
//!
//! Runs the same [pipeline](crate::compress) the HTTP endpoint uses, once per
//! input file, in parallel on [rayon](https://docs.rs/rayon). Results are
//! streamed as [`ProcessEvent`]s so the CLI can print each file as it
//! finishes.
//!
//! ## Output naming
//!
//! ```text
//! photos/IMG_0001.HEIC  →  photos/IMG_0001-compressed.jpg
//! photos/logo.png       →  out/logo-compressed.webp       (--out-dir out)
//! ```

use crate::compress::{CompressError, CompressRequest, CompressSettings, compress};
use crate::convert::Converter;
use crate::fallback::Tier;
use crate::imaging::{Bounds, FormatChoice, ImageBackend, OutputFormat, Quality};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Compress(#[from] CompressError),
}

/// Per-run options shared by every file.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub quality: Quality,
    pub bounds: Bounds,
    pub format: FormatChoice,
    /// Write outputs here instead of next to each input.
    pub out_dir: Option<PathBuf>,
}

/// A file that was compressed and written.
#[derive(Debug, Clone)]
pub struct WrittenFile {
    pub output: PathBuf,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    pub original_size: usize,
    pub compressed_size: usize,
    pub tier: Tier,
}

/// Progress events sent while processing.
#[derive(Debug)]
pub enum ProcessEvent {
    Done { input: PathBuf, file: WrittenFile },
    Failed { input: PathBuf, error: String },
}

/// Totals for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub bytes_in: usize,
    pub bytes_out: usize,
}

/// Where the compressed version of `input` goes.
pub fn output_path(input: &Path, out_dir: Option<&Path>, format: OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let name = format!("{stem}-compressed.{}", format.extension());
    match out_dir {
        Some(dir) => dir.join(name),
        None => input.with_file_name(name),
    }
}

/// Compress one file and write the result.
pub fn compress_file(
    backend: &dyn ImageBackend,
    converter: &dyn Converter,
    settings: &CompressSettings,
    input: &Path,
    options: &BatchOptions,
) -> Result<WrittenFile, ProcessError> {
    let bytes = std::fs::read(input)?;
    let request = CompressRequest {
        bytes: &bytes,
        quality: options.quality,
        bounds: options.bounds,
        format: options.format,
    };
    let result = compress(backend, converter, settings, request)?;

    let output = output_path(input, options.out_dir.as_deref(), result.format);
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&output, &result.bytes)?;

    Ok(WrittenFile {
        output,
        format: result.format,
        width: result.width,
        height: result.height,
        original_size: result.original_size,
        compressed_size: result.bytes.len(),
        tier: result.tier,
    })
}

/// Compress many files in parallel, reporting each one through `progress`.
pub fn process_files(
    backend: &dyn ImageBackend,
    converter: &dyn Converter,
    settings: &CompressSettings,
    inputs: &[PathBuf],
    options: &BatchOptions,
    progress: Option<Sender<ProcessEvent>>,
) -> BatchSummary {
    let results: Vec<Result<WrittenFile, (PathBuf, String)>> = inputs
        .par_iter()
        .map_with(progress, |progress, input| {
            let outcome = compress_file(backend, converter, settings, input, options);
            let event = match &outcome {
                Ok(file) => ProcessEvent::Done {
                    input: input.clone(),
                    file: file.clone(),
                },
                Err(e) => ProcessEvent::Failed {
                    input: input.clone(),
                    error: e.to_string(),
                },
            };
            if let Some(tx) = progress {
                tx.send(event).ok();
            }
            outcome.map_err(|e| (input.clone(), e.to_string()))
        })
        .collect();

    results
        .iter()
        .fold(BatchSummary::default(), |mut summary, result| {
            match result {
                Ok(file) => {
                    summary.succeeded += 1;
                    summary.bytes_in += file.original_size;
                    summary.bytes_out += file.compressed_size;
                }
                Err(_) => summary.failed += 1,
            }
            summary
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::tests::MockConverter;
    use crate::fallback::FallbackOptions;
    use crate::imaging::RustBackend;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use tempfile::TempDir;

    fn settings() -> CompressSettings {
        CompressSettings {
            fallback: FallbackOptions {
                disk: true,
                temp_dir: None,
                keep_temp_files: false,
            },
            allow_upscale: false,
        }
    }

    fn options(out_dir: Option<PathBuf>) -> BatchOptions {
        BatchOptions {
            quality: Quality::new(70),
            bounds: Bounds::square(100),
            format: FormatChoice::Auto,
            out_dir,
        }
    }

    fn create_test_image(path: &Path, width: u32, height: u32) {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 90])
        }));
        let format = ImageFormat::from_path(path).unwrap();
        img.save_with_format(path, format).unwrap();
    }

    #[test]
    fn output_path_next_to_input() {
        assert_eq!(
            output_path(Path::new("photos/IMG_0001.HEIC"), None, OutputFormat::Jpeg),
            PathBuf::from("photos/IMG_0001-compressed.jpg")
        );
    }

    #[test]
    fn output_path_in_out_dir() {
        assert_eq!(
            output_path(
                Path::new("photos/logo.png"),
                Some(Path::new("out")),
                OutputFormat::WebP
            ),
            PathBuf::from("out/logo-compressed.webp")
        );
    }

    #[test]
    fn compress_file_writes_output() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("shot.jpg");
        create_test_image(&input, 300, 200);

        let written = compress_file(
            &RustBackend::new(),
            &MockConverter::unavailable(),
            &settings(),
            &input,
            &options(None),
        )
        .unwrap();

        assert_eq!(written.output, tmp.path().join("shot-compressed.jpg"));
        assert_eq!((written.width, written.height), (100, 67));
        assert_eq!(written.tier, Tier::Buffer);
        let back = image::open(&written.output).unwrap();
        assert_eq!((back.width(), back.height()), (100, 67));
    }

    #[test]
    fn compress_file_missing_input_is_io_error() {
        let result = compress_file(
            &RustBackend::new(),
            &MockConverter::unavailable(),
            &settings(),
            Path::new("/nonexistent/shot.jpg"),
            &options(None),
        );
        assert!(matches!(result, Err(ProcessError::Io(_))));
    }

    #[test]
    fn process_files_reports_every_file() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("out");
        let good = tmp.path().join("a.png");
        create_test_image(&good, 50, 50);
        let bad = tmp.path().join("b.jpg");
        std::fs::write(&bad, b"definitely not a jpeg").unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let summary = process_files(
            &RustBackend::new(),
            &MockConverter::unavailable(),
            &settings(),
            &[good.clone(), bad.clone()],
            &options(Some(out.clone())),
            Some(tx),
        );

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert!(out.join("a-compressed.webp").exists());

        let events: Vec<ProcessEvent> = rx.iter().collect();
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(
            |e| matches!(e, ProcessEvent::Failed { input, .. } if *input == bad)
        ));
    }
}
