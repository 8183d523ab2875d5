//! Pure calculation functions for image dimensions and format choice.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{Bounds, FormatChoice, OutputFormat, SourceFormat};

/// Calculate dimensions that fit inside `bounds` while keeping the aspect ratio.
///
/// An unlimited axis does not constrain the result. When `allow_upscale` is
/// false an image already inside the bounds keeps its size. Neither output
/// dimension is ever 0.
///
/// # Examples
/// ```
/// # use image_compressor::imaging::{Bounds, fit_inside};
/// // 4000x3000 into a 1920 box → 1920x1440
/// assert_eq!(fit_inside((4000, 3000), Bounds::square(1920), false), (1920, 1440));
///
/// // Only a height limit
/// assert_eq!(fit_inside((1000, 2000), Bounds::new(0, 500), false), (250, 500));
/// ```
pub fn fit_inside(source: (u32, u32), bounds: Bounds, allow_upscale: bool) -> (u32, u32) {
    let (src_w, src_h) = source;
    if src_w == 0 || src_h == 0 || bounds.is_unlimited() {
        return source;
    }

    let scale_w = bounds.max_width.map(|w| w as f64 / src_w as f64);
    let scale_h = bounds.max_height.map(|h| h as f64 / src_h as f64);

    let mut scale = match (scale_w, scale_h) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => 1.0,
    };

    if !allow_upscale {
        scale = scale.min(1.0);
    }

    let w = ((src_w as f64 * scale).round() as u32).max(1);
    let h = ((src_h as f64 * scale).round() as u32).max(1);

    // Rounding can overshoot a bound by one pixel on the constrained axis
    let w = bounds.max_width.map_or(w, |max| w.min(max.max(1)));
    let h = bounds.max_height.map_or(h, |max| h.min(max.max(1)));
    (w, h)
}

/// Pick the output format for an upload.
///
/// Auto selects WebP for PNG sources or anything carrying an alpha channel,
/// and JPEG for everything else (JPEG, HEIF, TIFF, ...).
pub fn choose_output_format(
    source: &SourceFormat,
    has_alpha: bool,
    choice: FormatChoice,
) -> OutputFormat {
    match choice {
        FormatChoice::Explicit(format) => format,
        FormatChoice::Auto if *source == SourceFormat::Png || has_alpha => OutputFormat::WebP,
        FormatChoice::Auto => OutputFormat::Jpeg,
    }
}
