//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, BMP, TIFF, WebP) | `image` crate (pure Rust decoders) |
//! | Decode (AVIF) | [`avif`](super::avif): `avif-parse` + `rav1d`, alpha item included |
//! | Orientation | `kamadak-exif` tag read, `image` flips/rotations |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | Encode → WebP | `webp` (libwebp, lossy at a quality) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (best compression) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |

use super::avif::decode_avif;
use super::backend::{BackendError, DecodedImage, ImageBackend};
use super::orientation::read_orientation;
use super::params::{EncodeParams, OutputFormat, SourceFormat};
use super::sniff::sniff;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use std::sync::LazyLock;

/// Input formats whose decoders are compiled in.
///
/// AVIF is not listed: the `image` crate's `"avif"` feature only enables the
/// **encoder** (rav1e), so AVIF input goes through our rav1d-based decoder.
const DECODE_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("gif", ImageFormat::Gif),
    ("bmp", ImageFormat::Bmp),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_INPUTS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    let mut names: Vec<&'static str> = DECODE_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(name, _)| *name)
        .collect();
    names.push("avif");
    names
});

/// Returns the input format names that have working decoders compiled in.
pub fn supported_input_formats() -> &'static [&'static str] {
    &SUPPORTED_INPUTS
}

/// Resize with the same filter everywhere.
pub fn resize(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    if (img.width(), img.height()) == (width, height) {
        return img.clone();
    }
    img.resize_exact(width, height, FilterType::Lanczos3)
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn is_avif_bytes(bytes: &[u8]) -> bool {
    sniff(bytes).is_some_and(|d| d.ext == "avif")
}

fn is_avif_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("avif"))
}

/// Decode with a known or guessed format, attaching orientation.
fn decode_with_reader<R: std::io::BufRead + std::io::Seek>(
    reader: ImageReader<R>,
    bytes: &[u8],
    desc: &str,
) -> Result<DecodedImage, BackendError> {
    let format = reader
        .format()
        .ok_or_else(|| BackendError::decode(desc, "unrecognised image format"))?;
    let image = reader
        .decode()
        .map_err(|e| BackendError::decode(desc, e))?;
    Ok(DecodedImage {
        image,
        source_format: SourceFormat::from_image_format(format),
        orientation: read_orientation(bytes),
    })
}

fn decode_avif_bytes(bytes: &[u8], desc: &str) -> Result<DecodedImage, BackendError> {
    Ok(DecodedImage {
        image: decode_avif(bytes, desc)?,
        source_format: SourceFormat::Avif,
        orientation: read_orientation(bytes),
    })
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    // JPEG has no alpha; grayscale stays single-channel
    let result = if img.color().has_color() {
        let rgb = img.to_rgb8();
        encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)
    } else {
        let luma = img.to_luma8();
        encoder.write_image(
            luma.as_raw(),
            luma.width(),
            luma.height(),
            image::ExtendedColorType::L8,
        )
    };
    result.map_err(|e| BackendError::encode(OutputFormat::Jpeg, e))?;
    Ok(out)
}

/// Lossy WebP through libwebp. Oversized images (past 16383 px on an edge)
/// come back as an encode error.
fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, BackendError> {
    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
            .encode_simple(false, quality as f32)
    } else {
        let rgb = img.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height())
            .encode_simple(false, quality as f32)
    };
    let memory = encoded.map_err(|e| BackendError::encode(OutputFormat::WebP, format!("{e:?}")))?;
    if memory.is_empty() {
        return Err(BackendError::encode(OutputFormat::WebP, "libwebp produced no output"));
    }
    Ok(memory.to_vec())
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut out, CompressionType::Best, PngFilter::Adaptive);
    let result = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        encoder.write_image(rgba.as_raw(), rgba.width(), rgba.height(), image::ExtendedColorType::Rgba8)
    } else {
        let rgb = img.to_rgb8();
        encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)
    };
    result.map_err(|e| BackendError::encode(OutputFormat::Png, e))?;
    Ok(out)
}

/// Encode as AVIF using rav1e (speed=6 for reasonable throughput).
fn encode_avif(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::new();
    let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(&mut out, 6, quality);
    img.write_with_encoder(encoder)
        .map_err(|e| BackendError::encode(OutputFormat::Avif, e))?;
    Ok(out)
}

impl ImageBackend for RustBackend {
    fn decode_bytes(&self, bytes: &[u8]) -> Result<DecodedImage, BackendError> {
        if is_avif_bytes(bytes) {
            return decode_avif_bytes(bytes, "buffer");
        }
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(BackendError::Io)?;
        decode_with_reader(reader, bytes, "buffer")
    }

    fn decode_path(&self, path: &Path) -> Result<DecodedImage, BackendError> {
        let desc = path.display().to_string();
        let bytes = std::fs::read(path)?;
        if is_avif_path(path) || is_avif_bytes(&bytes) {
            return decode_avif_bytes(&bytes, &desc);
        }

        // Extension first, like a file-based loader would; content sniff if that's unknown
        let mut reader = ImageReader::new(Cursor::new(bytes.as_slice()));
        match ImageFormat::from_path(path) {
            Ok(format) => reader.set_format(format),
            Err(_) => {
                reader = reader.with_guessed_format().map_err(BackendError::Io)?;
            }
        }
        decode_with_reader(reader, &bytes, &desc)
    }

    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, BackendError> {
        let quality = params.quality.value() as u8;
        match params.format {
            OutputFormat::Jpeg => encode_jpeg(image, quality),
            OutputFormat::WebP => encode_webp(image, quality),
            OutputFormat::Png => encode_png(image),
            OutputFormat::Avif => encode_avif(image, quality),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::params::Quality;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn encode_as(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    fn params(format: OutputFormat, quality: u32) -> EncodeParams {
        EncodeParams {
            format,
            quality: Quality::new(quality),
        }
    }

    #[test]
    fn supported_inputs_include_common_formats() {
        let names = supported_input_formats();
        for expected in &["jpeg", "png", "tiff", "webp", "avif"] {
            assert!(names.contains(expected), "expected {expected} in supported inputs");
        }
    }

    #[test]
    fn decode_bytes_jpeg() {
        let bytes = encode_as(&gradient(200, 150), ImageFormat::Jpeg);
        let decoded = RustBackend::new().decode_bytes(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (200, 150));
        assert_eq!(decoded.source_format, SourceFormat::Jpeg);
        assert!(decoded.orientation.is_normal());
    }

    #[test]
    fn decode_bytes_png_keeps_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([1, 2, 3, 4])));
        let bytes = encode_as(&img, ImageFormat::Png);
        let decoded = RustBackend::new().decode_bytes(&bytes).unwrap();
        assert_eq!(decoded.source_format, SourceFormat::Png);
        assert!(decoded.has_alpha());
    }

    #[test]
    fn decode_bytes_garbage_errors() {
        let result = RustBackend::new().decode_bytes(b"this is not an image at all");
        assert!(matches!(result, Err(BackendError::Decode { .. })));
    }

    #[test]
    fn decode_path_uses_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("upload.png");
        std::fs::write(&path, encode_as(&gradient(32, 16), ImageFormat::Png)).unwrap();

        let decoded = RustBackend::new().decode_path(&path).unwrap();
        assert_eq!(decoded.dimensions(), (32, 16));
        assert_eq!(decoded.source_format, SourceFormat::Png);
    }

    #[test]
    fn decode_path_unknown_extension_sniffs_content() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("upload.bin");
        std::fs::write(&path, encode_as(&gradient(20, 10), ImageFormat::Jpeg)).unwrap();

        let decoded = RustBackend::new().decode_path(&path).unwrap();
        assert_eq!(decoded.source_format, SourceFormat::Jpeg);
    }

    #[test]
    fn decode_path_missing_file_is_io_error() {
        let result = RustBackend::new().decode_path(Path::new("/nonexistent/upload.jpg"));
        assert!(matches!(result, Err(BackendError::Io(_))));
    }

    #[test]
    fn encode_jpeg_roundtrips_dimensions() {
        let backend = RustBackend::new();
        let bytes = backend
            .encode(&gradient(64, 48), &params(OutputFormat::Jpeg, 70))
            .unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
        assert_eq!(
            image::load_from_memory(&bytes).unwrap().into_rgb8().dimensions(),
            (64, 48)
        );
    }

    #[test]
    fn encode_jpeg_drops_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([9, 9, 9, 10])));
        let bytes = RustBackend::new()
            .encode(&img, &params(OutputFormat::Jpeg, 50))
            .unwrap();
        assert!(!image::load_from_memory(&bytes).unwrap().color().has_alpha());
    }

    #[test]
    fn lower_jpeg_quality_is_smaller() {
        let backend = RustBackend::new();
        let img = gradient(256, 256);
        let high = backend.encode(&img, &params(OutputFormat::Jpeg, 95)).unwrap();
        let low = backend.encode(&img, &params(OutputFormat::Jpeg, 20)).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn encode_webp_with_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([200, 0, 0, 100])));
        let bytes = RustBackend::new()
            .encode(&img, &params(OutputFormat::WebP, 70))
            .unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[test]
    fn oversized_webp_is_an_encode_error() {
        // WebP caps each edge at 16383 px
        let img = gradient(16400, 2);
        let result = RustBackend::new().encode(&img, &params(OutputFormat::WebP, 70));
        assert!(
            matches!(
                result,
                Err(BackendError::Encode {
                    format: OutputFormat::WebP,
                    ..
                })
            ),
            "{result:?}"
        );
    }

    #[test]
    fn encode_png_is_decodable() {
        let bytes = RustBackend::new()
            .encode(&gradient(12, 7), &params(OutputFormat::Png, 10))
            .unwrap();
        let back = image::load_from_memory(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (12, 7));
    }

    #[test]
    fn avif_encode_then_decode_bytes() {
        let backend = RustBackend::new();
        let bytes = backend
            .encode(&gradient(64, 48), &params(OutputFormat::Avif, 85))
            .unwrap();

        let decoded = backend.decode_bytes(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
        assert_eq!(decoded.source_format, SourceFormat::Avif);
    }

    #[test]
    fn transparent_avif_decodes_with_alpha() {
        let backend = RustBackend::new();
        // left half transparent, right half opaque
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(32, 16, |x, _| {
            if x < 16 {
                Rgba([255, 0, 0, 0])
            } else {
                Rgba([0, 0, 255, 255])
            }
        }));
        let bytes = backend
            .encode(&img, &params(OutputFormat::Avif, 90))
            .unwrap();

        let decoded = backend.decode_bytes(&bytes).unwrap();
        assert!(decoded.has_alpha());
        assert_eq!(decoded.dimensions(), (32, 16));
        let rgba = decoded.image.to_rgba8();
        assert!(rgba.get_pixel(2, 8).0[3] < 64);
        assert!(rgba.get_pixel(29, 8).0[3] > 192);
    }

    #[test]
    fn opaque_avif_decodes_without_alpha() {
        let backend = RustBackend::new();
        let bytes = backend
            .encode(&gradient(16, 16), &params(OutputFormat::Avif, 80))
            .unwrap();
        assert!(!backend.decode_bytes(&bytes).unwrap().has_alpha());
    }

    #[test]
    fn resize_is_exact() {
        let out = resize(&gradient(400, 300), 200, 150);
        assert_eq!((out.width(), out.height()), (200, 150));
    }
}
