//! Container detection from magic bytes.
//!
//! Used when the primary decode fails: the detected type names the temp file
//! (so path-based decoding and external converters see the right extension)
//! and is reported back to the client in the 415 body.
//!
//! `image::guess_format` covers the formats the `image` crate knows about.
//! ISO-BMFF containers (HEIC/HEIF/AVIF) are recognised separately from the
//! `ftyp` box brands, since those are the uploads that most often fail.

use serde::Serialize;

/// A sniffed file type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detected {
    pub mime: String,
    pub ext: String,
}

impl Detected {
    fn new(mime: &str, ext: &str) -> Self {
        Self {
            mime: mime.to_string(),
            ext: ext.to_string(),
        }
    }
}

const HEIF_BRANDS: &[&[u8; 4]] = &[
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"hevm", b"hevs",
];
const HEIF_GENERIC_BRANDS: &[&[u8; 4]] = &[b"mif1", b"msf1"];
const AVIF_BRANDS: &[&[u8; 4]] = &[b"avif", b"avis"];

/// Identify the container of `bytes`, if recognisable.
pub fn sniff(bytes: &[u8]) -> Option<Detected> {
    if let Some(detected) = sniff_isobmff(bytes) {
        return Some(detected);
    }

    use image::ImageFormat as F;
    let format = image::guess_format(bytes).ok()?;
    let (mime, ext) = match format {
        F::Jpeg => ("image/jpeg", "jpg"),
        F::Png => ("image/png", "png"),
        F::Gif => ("image/gif", "gif"),
        F::WebP => ("image/webp", "webp"),
        F::Tiff => ("image/tiff", "tif"),
        F::Bmp => ("image/bmp", "bmp"),
        F::Ico => ("image/x-icon", "ico"),
        F::Avif => ("image/avif", "avif"),
        F::Pnm => ("image/x-portable-anymap", "pnm"),
        F::Tga => ("image/x-tga", "tga"),
        F::Dds => ("image/vnd-ms.dds", "dds"),
        F::Hdr => ("image/vnd.radiance", "hdr"),
        F::OpenExr => ("image/x-exr", "exr"),
        F::Farbfeld => ("image/x-farbfeld", "ff"),
        F::Qoi => ("image/x-qoi", "qoi"),
        _ => return None,
    };
    Some(Detected::new(mime, ext))
}

/// Parse the leading `ftyp` box: major brand, then compatible brands.
fn sniff_isobmff(bytes: &[u8]) -> Option<Detected> {
    if bytes.len() < 16 || &bytes[4..8] != b"ftyp" {
        return None;
    }
    let box_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let end = box_len.clamp(16, bytes.len());

    // major brand at 8..12, minor version at 12..16, compatible brands after
    let brands: Vec<&[u8]> = std::iter::once(&bytes[8..12])
        .chain(bytes[16..end].chunks_exact(4))
        .collect();

    let has = |set: &[&[u8; 4]]| brands.iter().any(|b| set.iter().any(|s| &s[..] == *b));

    if has(AVIF_BRANDS) {
        Some(Detected::new("image/avif", "avif"))
    } else if has(HEIF_BRANDS) {
        Some(Detected::new("image/heic", "heic"))
    } else if has(HEIF_GENERIC_BRANDS) {
        Some(Detected::new("image/heif", "heif"))
    } else {
        None
    }
}
