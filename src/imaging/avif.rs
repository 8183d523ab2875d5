//! AVIF input without the C dav1d library.
//!
//! The `image` crate's `"avif"` feature only enables the encoder (rav1e); its
//! `"avif-native"` decoder links dav1d. Instead the container is parsed with
//! `avif-parse` and each AV1 item is decoded with `rav1d` (a Rust port of
//! dav1d) through its C-style API.
//!
//! A transparent AVIF stores alpha as a second, monochrome AV1 item. When it
//! is present the result is RGBA so the pipeline sees the alpha channel.

use super::backend::BackendError;
use image::{DynamicImage, RgbImage, RgbaImage};
use rav1d::include::dav1d::data::Dav1dData;
use rav1d::include::dav1d::dav1d::{Dav1dContext, Dav1dSettings};
use rav1d::include::dav1d::headers::{
    DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
    DAV1D_PIXEL_LAYOUT_I444,
};
use rav1d::include::dav1d::picture::Dav1dPicture;
use rav1d::src::lib::{
    dav1d_close, dav1d_data_create, dav1d_data_unref, dav1d_default_settings, dav1d_get_picture,
    dav1d_open, dav1d_picture_unref, dav1d_send_data,
};
use std::io::Cursor;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

/// Decode a complete AVIF file.
pub fn decode_avif(file_data: &[u8], desc: &str) -> Result<DynamicImage, BackendError> {
    let avif = avif_parse::read_avif(&mut Cursor::new(file_data))
        .map_err(|e| BackendError::decode(desc, format!("AVIF container: {e:?}")))?;

    let color = decode_item(&avif.primary_item, |frame| frame.to_rgb())
        .map_err(|e| BackendError::decode(desc, e))?;

    let Some(alpha_item) = avif.alpha_item.as_ref() else {
        return RgbImage::from_raw(color.width, color.height, color.samples)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| BackendError::decode(desc, "decoded AVIF buffer has the wrong size"));
    };

    let alpha = decode_item(alpha_item, |frame| frame.to_luma())
        .map_err(|e| BackendError::decode(desc, format!("alpha item: {e}")))?;
    if (alpha.width, alpha.height) != (color.width, color.height) {
        return Err(BackendError::decode(
            desc,
            format!(
                "alpha item is {}x{} but colour is {}x{}",
                alpha.width, alpha.height, color.width, color.height
            ),
        ));
    }

    let rgba = join_alpha(&color.samples, &alpha.samples, avif.premultiplied_alpha);
    RgbaImage::from_raw(color.width, color.height, rgba)
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| BackendError::decode(desc, "decoded AVIF buffer has the wrong size"))
}

/// Interleave RGB samples with a separate alpha plane.
///
/// `premultiplied` is the container's `prem` flag: colour was stored
/// multiplied by alpha and has to be divided back out.
fn join_alpha(rgb: &[u8], alpha: &[u8], premultiplied: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(alpha.len() * 4);
    for (px, &a) in rgb.chunks_exact(3).zip(alpha) {
        for &c in px {
            let c = if premultiplied && a > 0 {
                ((u32::from(c) * 255 + u32::from(a) / 2) / u32::from(a)).min(255) as u8
            } else {
                c
            };
            out.push(c);
        }
        out.push(a);
    }
    out
}

/// One decoded AV1 item, converted to 8-bit samples.
struct Plane {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

fn decode_item(
    av1: &[u8],
    convert: impl FnOnce(&Av1Frame<'_>) -> Vec<u8>,
) -> Result<Plane, String> {
    let decoder = Av1Decoder::open()?;
    let picture = decoder.decode(av1)?;
    let frame = picture.frame()?;
    Ok(Plane {
        width: frame.width,
        height: frame.height,
        samples: convert(&frame),
    })
}

/// A rav1d context, closed on drop.
struct Av1Decoder(Option<Dav1dContext>);

impl Av1Decoder {
    fn open() -> Result<Self, String> {
        let mut settings = MaybeUninit::<Dav1dSettings>::uninit();
        let settings_ptr =
            NonNull::new(settings.as_mut_ptr()).ok_or("rav1d settings allocation failed")?;
        // SAFETY: dav1d_default_settings initializes every field
        unsafe { dav1d_default_settings(settings_ptr) };
        let mut settings = unsafe { settings.assume_init() };
        settings.n_threads = 1;
        settings.max_frame_delay = 1;

        let mut decoder = Self(None);
        let rc = unsafe { dav1d_open(NonNull::new(&mut decoder.0), NonNull::new(&mut settings)) };
        if rc.0 != 0 {
            return Err(format!("rav1d open failed ({})", rc.0));
        }
        Ok(decoder)
    }

    /// Feed a single still-image item and take its picture.
    fn decode(&self, av1: &[u8]) -> Result<Av1Picture, String> {
        let mut data = Dav1dData::default();
        let buf = unsafe { dav1d_data_create(NonNull::new(&mut data), av1.len()) };
        if buf.is_null() {
            return Err("rav1d data_create failed".into());
        }
        // SAFETY: buf was just allocated with av1.len() bytes
        unsafe { std::ptr::copy_nonoverlapping(av1.as_ptr(), buf, av1.len()) };

        let rc = unsafe { dav1d_send_data(self.0, NonNull::new(&mut data)) };
        if rc.0 != 0 {
            unsafe { dav1d_data_unref(NonNull::new(&mut data)) };
            return Err(format!("rav1d send_data failed ({})", rc.0));
        }

        let mut picture: Dav1dPicture = unsafe { std::mem::zeroed() };
        let rc = unsafe { dav1d_get_picture(self.0, NonNull::new(&mut picture)) };
        if rc.0 != 0 {
            return Err(format!("rav1d get_picture failed ({})", rc.0));
        }
        Ok(Av1Picture(picture))
    }
}

impl Drop for Av1Decoder {
    fn drop(&mut self) {
        unsafe { dav1d_close(NonNull::new(&mut self.0)) };
    }
}

/// A picture returned by rav1d, unreferenced on drop.
struct Av1Picture(Dav1dPicture);

impl Drop for Av1Picture {
    fn drop(&mut self) {
        unsafe { dav1d_picture_unref(NonNull::new(&mut self.0)) };
    }
}

impl Av1Picture {
    fn frame(&self) -> Result<Av1Frame<'_>, String> {
        let pic = &self.0;
        let plane = |i: usize| pic.data[i].map(|p| p.as_ptr() as *const u8);
        let luma = plane(0).ok_or("rav1d returned no luma plane")?;

        let layout = pic.p.layout;
        let chroma = if layout == DAV1D_PIXEL_LAYOUT_I400 {
            None
        } else {
            let (ss_x, ss_y) = match layout {
                DAV1D_PIXEL_LAYOUT_I420 => (true, true),
                DAV1D_PIXEL_LAYOUT_I422 => (true, false),
                DAV1D_PIXEL_LAYOUT_I444 => (false, false),
                _ => return Err(format!("unsupported AVIF pixel layout: {layout}")),
            };
            let (Some(u), Some(v)) = (plane(1), plane(2)) else {
                return Err("rav1d returned no chroma planes".into());
            };
            Some(Chroma {
                u,
                v,
                stride: pic.stride[1],
                ss_x,
                ss_y,
            })
        };

        Ok(Av1Frame {
            luma,
            luma_stride: pic.stride[0],
            chroma,
            width: pic.p.w as u32,
            height: pic.p.h as u32,
            bpc: pic.p.bpc as u32,
            _picture: PhantomData,
        })
    }
}

struct Chroma {
    u: *const u8,
    v: *const u8,
    stride: isize,
    /// Horizontal / vertical subsampling (I420 = both).
    ss_x: bool,
    ss_y: bool,
}

/// Borrowed view of a picture's planes.
struct Av1Frame<'a> {
    luma: *const u8,
    luma_stride: isize,
    chroma: Option<Chroma>,
    width: u32,
    height: u32,
    bpc: u32,
    _picture: PhantomData<&'a Av1Picture>,
}

impl Av1Frame<'_> {
    fn max_value(&self) -> f32 {
        ((1u32 << self.bpc) - 1) as f32
    }

    /// Read one sample, 8-bit or 16-bit storage.
    fn sample(&self, plane: *const u8, stride: isize, x: u32, y: u32) -> f32 {
        // SAFETY: x < width and y < height of the plane rav1d handed out
        unsafe {
            if self.bpc <= 8 {
                *plane.offset(y as isize * stride + x as isize) as f32
            } else {
                *(plane.offset(y as isize * stride + x as isize * 2) as *const u16) as f32
            }
        }
    }

    /// Luma only, rescaled to 8 bits. Used for alpha items.
    fn to_luma(&self) -> Vec<u8> {
        let scale = 255.0 / self.max_value();
        let mut out = Vec::with_capacity((self.width * self.height) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let v = self.sample(self.luma, self.luma_stride, x, y) * scale;
                out.push(v.clamp(0.0, 255.0) as u8);
            }
        }
        out
    }

    /// Interleaved RGB8 using BT.601 coefficients.
    fn to_rgb(&self) -> Vec<u8> {
        let Some(chroma) = &self.chroma else {
            return self.to_luma().into_iter().flat_map(|v| [v, v, v]).collect();
        };

        let scale = 255.0 / self.max_value();
        let center = (1u32 << (self.bpc - 1)) as f32;
        let mut out = Vec::with_capacity((self.width * self.height * 3) as usize);

        for y in 0..self.height {
            let cy = if chroma.ss_y { y / 2 } else { y };
            for x in 0..self.width {
                let cx = if chroma.ss_x { x / 2 } else { x };
                let luma = self.sample(self.luma, self.luma_stride, x, y);
                let cb = self.sample(chroma.u, chroma.stride, cx, cy) - center;
                let cr = self.sample(chroma.v, chroma.stride, cx, cy) - center;

                let rgb = [
                    luma + 1.402 * cr,
                    luma - 0.344136 * cb - 0.714136 * cr,
                    luma + 1.772 * cb,
                ];
                out.extend(rgb.map(|c| (c * scale).clamp(0.0, 255.0) as u8));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_alpha_interleaves() {
        let rgb = [10, 20, 30, 40, 50, 60];
        let alpha = [255, 0];
        assert_eq!(
            join_alpha(&rgb, &alpha, false),
            vec![10, 20, 30, 255, 40, 50, 60, 0]
        );
    }

    #[test]
    fn join_alpha_unpremultiplies() {
        // 50% alpha, colour stored at half strength
        let out = join_alpha(&[100, 50, 0], &[128], true);
        assert_eq!(out, vec![199, 100, 0, 128]);
    }

    #[test]
    fn join_alpha_keeps_fully_transparent_pixels() {
        assert_eq!(join_alpha(&[7, 8, 9], &[0], true), vec![7, 8, 9, 0]);
    }

    #[test]
    fn garbage_is_a_container_error() {
        let err = decode_avif(b"not an avif", "buffer").unwrap_err();
        assert!(err.to_string().contains("AVIF container"), "{err}");
    }
}
