//! EXIF-driven auto-rotation.
//!
//! The orientation tag (0x0112) is read with `kamadak-exif` from the same bytes
//! that were decoded, and the matching flip/rotate is applied to the pixels.
//! Encoders in this crate never write EXIF, so the result displays upright
//! everywhere.

use image::DynamicImage;
use std::io::Cursor;

/// EXIF orientation value (1–8). Anything else is treated as 1.
///
/// 1 = normal, 2 = mirrored, 3 = 180°, 4 = flipped vertically,
/// 5 = mirrored + 90° CW, 6 = 90° CW, 7 = mirrored + 270° CW, 8 = 270° CW
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Orientation(pub u32);

impl Orientation {
    pub const NORMAL: Orientation = Orientation(1);

    pub fn is_normal(self) -> bool {
        !(2..=8).contains(&self.0)
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::NORMAL
    }
}

/// Read the orientation from an encoded image. Missing EXIF or tag → normal.
pub fn read_orientation(bytes: &[u8]) -> Orientation {
    let mut cursor = Cursor::new(bytes);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut cursor) else {
        return Orientation::NORMAL;
    };

    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .map(Orientation)
        .unwrap_or_default()
}

/// Apply an orientation transform.
pub fn apply_orientation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation.0 {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}
