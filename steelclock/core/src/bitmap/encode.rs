//! Packed Frame Encoder
//!
//! Converts a grayscale [`Canvas`] into the 1-bpp bitmap the device gateway
//! expects.
//!
//! # Frame Format
//!
//! ```text
//! byte 0: pixels 0..8 of row 0, MSB = leftmost pixel
//! byte 1: pixels 8..16 of row 0
//! ...
//! ```
//!
//! Rows are packed back to back; the frame is `ceil(W * H / 8)` bytes. A bit
//! is set iff the pixel intensity is at or above the display threshold.

use thiserror::Error;

use super::Canvas;
use crate::geometry::Display;

/// Canvas does not match the display it is being encoded for
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("canvas is {actual_width}x{actual_height} but display is {expected_width}x{expected_height}")]
pub struct EncodingError {
    /// Declared display width
    pub expected_width: u32,
    /// Declared display height
    pub expected_height: u32,
    /// Width of the canvas handed to the encoder
    pub actual_width: u32,
    /// Height of the canvas handed to the encoder
    pub actual_height: u32,
}

/// Pack `canvas` into a 1-bpp frame for `display`
///
/// # Errors
///
/// Returns [`EncodingError`] if the canvas dimensions differ from the
/// display's.
pub fn encode(canvas: &Canvas, display: &Display) -> Result<Vec<u8>, EncodingError> {
    let mut out = Vec::with_capacity(display.frame_len());
    encode_into(canvas, display, &mut out)?;
    Ok(out)
}

fn encode_into(canvas: &Canvas, display: &Display, out: &mut Vec<u8>) -> Result<(), EncodingError> {
    if canvas.width() != display.width || canvas.height() != display.height {
        return Err(EncodingError {
            expected_width: display.width,
            expected_height: display.height,
            actual_width: canvas.width(),
            actual_height: canvas.height(),
        });
    }

    out.clear();
    out.resize(display.frame_len(), 0);

    let threshold = display.threshold;
    for (idx, &value) in canvas.pixels().iter().enumerate() {
        if value >= threshold {
            out[idx / 8] |= 0x80 >> (idx % 8);
        }
    }
    Ok(())
}

/// Reusable encoder bound to one display
///
/// Keeps its output buffer between frames so the render loop does not
/// allocate per tick.
#[derive(Debug)]
pub struct FrameEncoder {
    display: Display,
    buffer: Vec<u8>,
}

impl FrameEncoder {
    /// Create an encoder for `display`
    #[must_use]
    pub fn new(display: Display) -> Self {
        Self {
            display,
            buffer: Vec::with_capacity(display.frame_len()),
        }
    }

    /// The display this encoder packs for
    #[must_use]
    pub fn display(&self) -> &Display {
        &self.display
    }

    /// Encode into the internal buffer and borrow the result
    pub fn encode(&mut self, canvas: &Canvas) -> Result<&[u8], EncodingError> {
        encode_into(canvas, &self.display, &mut self.buffer)?;
        Ok(&self.buffer)
    }
}
