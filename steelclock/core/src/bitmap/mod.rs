//! Bitmap Primitives
//!
//! Grayscale canvas, clipped blits, text rendering and the packed 1-bpp
//! encoder. Everything here is CPU-only and deterministic: identical inputs
//! always produce identical bytes, which the frame deduplicator relies on.
//!
//! # Pixel model
//!
//! A [`Canvas`] stores one `u8` intensity per pixel, row-major. Drawing
//! outside the canvas is silently clipped, so widgets and the compositor
//! never need to bounds-check their own coordinates.

mod encode;
mod text;

use std::collections::BTreeMap;
use std::convert::Infallible;

use embedded_graphics::pixelcolor::{Gray8, GrayColor};
use embedded_graphics::prelude::{DrawTarget, OriginDimensions, Pixel, Size};

pub use encode::{encode, EncodingError, FrameEncoder};
pub use text::{draw_text, FontFace, HorizontalAlign, TextBox, VerticalAlign};

/// Full-intensity pixel value
pub const WHITE: u8 = 0xFF;

/// Zero-intensity pixel value
pub const BLACK: u8 = 0x00;

/// Encoded frames keyed by resolution key (`image-data-<W>x<H>`)
///
/// A single-display session always carries exactly one entry; the map shape
/// lets one payload address several resolutions.
pub type FrameMap = BTreeMap<String, Vec<u8>>;

/// Build a single-entry [`FrameMap`]
#[must_use]
pub fn frame_map(key: impl Into<String>, bytes: Vec<u8>) -> FrameMap {
    let mut map = FrameMap::new();
    map.insert(key.into(), bytes);
    map
}

/// Row-major grayscale image
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    /// Allocate a `width` x `height` canvas filled with `background`
    #[must_use]
    pub fn new(width: u32, height: u32, background: u8) -> Self {
        Self {
            width,
            height,
            pixels: vec![background; width as usize * height as usize],
        }
    }

    /// Width in pixels
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw row-major pixel buffer
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel at (x, y), or `None` when outside the canvas
    #[must_use]
    pub fn get(&self, x: i32, y: i32) -> Option<u8> {
        self.index_of(x, y).map(|idx| self.pixels[idx])
    }

    /// Set the pixel at (x, y); out-of-bounds writes are dropped
    pub fn set(&mut self, x: i32, y: i32, value: u8) {
        if let Some(idx) = self.index_of(x, y) {
            self.pixels[idx] = value;
        }
    }

    /// Overwrite every pixel with `value`
    pub fn fill(&mut self, value: u8) {
        self.pixels.fill(value);
    }

    /// Fill a rectangle, clipped to the canvas
    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, value: u8) {
        let Some((x0, x1)) = clip_span(x, w, self.width) else {
            return;
        };
        let Some((y0, y1)) = clip_span(y, h, self.height) else {
            return;
        };
        let stride = self.width as usize;
        for row in y0..y1 {
            self.pixels[row * stride + x0..row * stride + x1].fill(value);
        }
    }

    /// Copy `src` onto this canvas with its top-left at (dx, dy)
    ///
    /// Pixels landing outside this canvas are clipped. When `transparent`
    /// is set, source pixels equal to it leave the destination untouched.
    pub fn draw_sub(&mut self, src: &Canvas, dx: i32, dy: i32, transparent: Option<u8>) {
        let Some((x0, x1)) = clip_span(dx, src.width, self.width) else {
            return;
        };
        let Some((y0, y1)) = clip_span(dy, src.height, self.height) else {
            return;
        };

        let dst_stride = self.width as usize;
        let src_stride = src.width as usize;
        // Offsets into the source for the first visible destination pixel
        let sx0 = (x0 as i64 - i64::from(dx)) as usize;
        let sy0 = (y0 as i64 - i64::from(dy)) as usize;
        let span = x1 - x0;

        for (i, row) in (y0..y1).enumerate() {
            let src_row = &src.pixels[(sy0 + i) * src_stride + sx0..][..span];
            let dst_row = &mut self.pixels[row * dst_stride + x0..][..span];
            match transparent {
                None => dst_row.copy_from_slice(src_row),
                Some(key) => {
                    for (dst, &value) in dst_row.iter_mut().zip(src_row) {
                        if value != key {
                            *dst = value;
                        }
                    }
                }
            }
        }
    }

    fn index_of(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }
}

/// Intersect `[start, start + len)` with `[0, limit)`
///
/// Returns `None` when the intersection is empty.
fn clip_span(start: i32, len: u32, limit: u32) -> Option<(usize, usize)> {
    let lo = i64::from(start).max(0);
    let hi = (i64::from(start) + i64::from(len)).min(i64::from(limit));
    (lo < hi).then(|| (lo as usize, hi as usize))
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for Canvas {
    type Color = Gray8;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set(point.x, point.y, color.luma());
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.fill(color.luma());
        Ok(())
    }
}
