//! Display, Position and Style
//!
//! Value types shared by the bitmap layer, the widget contract and the
//! layout compositor. All of them are plain `Copy` data; nothing here
//! allocates or locks.

use serde::{Deserialize, Serialize};

/// Largest display the encoder accepts (pixels).
///
/// 64 Ki pixels packs into an 8 KiB frame.
pub const MAX_DISPLAY_PIXELS: u32 = 65_536;

/// Default intensity threshold for the 1-bpp encoder
pub const DEFAULT_THRESHOLD: u8 = 128;

/// Physical display the frames are produced for
///
/// Immutable for the lifetime of a session. A configuration reload that
/// changes the display builds a new compositor around the new value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Display {
    /// Width in pixels (multiple of 8)
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Background intensity the canvas is cleared to every frame
    pub background: u8,
    /// Pixels at or above this intensity encode as 1
    pub threshold: u8,
}

impl Default for Display {
    fn default() -> Self {
        Self {
            width: 128,
            height: 40,
            background: 0,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl Display {
    /// Create a display with the default background and threshold
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Set the background intensity
    #[must_use]
    pub fn with_background(mut self, background: u8) -> Self {
        self.background = background;
        self
    }

    /// Set the encoder threshold
    #[must_use]
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Check the packed-bitmap constraints
    ///
    /// Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "display must be non-empty, got {}x{}",
                self.width, self.height
            ));
        }
        if self.width % 8 != 0 {
            return Err(format!(
                "display width {} is not a multiple of 8",
                self.width
            ));
        }
        let pixels = u64::from(self.width) * u64::from(self.height);
        if pixels > u64::from(MAX_DISPLAY_PIXELS) {
            return Err(format!(
                "display {}x{} exceeds the {MAX_DISPLAY_PIXELS} pixel encoder budget",
                self.width, self.height
            ));
        }
        Ok(())
    }

    /// Number of pixels on the display
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Length of one packed frame in bytes
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.pixel_count().div_ceil(8)
    }

    /// JSON field carrying frame bytes, e.g. `image-data-128x40`
    #[must_use]
    pub fn resolution_key(&self) -> String {
        format!("image-data-{}x{}", self.width, self.height)
    }

    /// Gateway device-type token, e.g. `screened-128x40`
    #[must_use]
    pub fn resolution_token(&self) -> String {
        format!("screened-{}x{}", self.width, self.height)
    }
}

/// Widget placement on the display
///
/// `x`/`y` may be negative or run past the display edge; the compositor
/// clips pixel-wise. Rendering order is ascending `z`, ties broken by
/// insertion order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Left edge in display pixels
    pub x: i32,
    /// Top edge in display pixels
    pub y: i32,
    /// Width in pixels
    pub w: u32,
    /// Height in pixels
    pub h: u32,
    /// Stacking order (higher paints later)
    #[serde(default)]
    pub z: i32,
}

impl Position {
    /// Create a position at z = 0
    #[must_use]
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h, z: 0 }
    }

    /// Set the z order
    #[must_use]
    pub fn with_z(mut self, z: i32) -> Self {
        self.z = z;
        self
    }
}

/// How a widget's pixels combine with what is already on the canvas
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Background {
    /// Every source pixel overwrites the destination
    Opaque(u8),
    /// Source pixels equal to `key` are skipped
    Transparent {
        /// The widget's own background value
        key: u8,
    },
}

/// Widget background policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Style {
    /// Composition mode and background intensity
    pub background: Background,
}

impl Default for Style {
    fn default() -> Self {
        Self::opaque(0)
    }
}

impl Style {
    /// Opaque widget filled with `background`
    #[must_use]
    pub fn opaque(background: u8) -> Self {
        Self {
            background: Background::Opaque(background),
        }
    }

    /// Transparent widget whose pixels equal to `key` show what is below
    #[must_use]
    pub fn transparent(key: u8) -> Self {
        Self {
            background: Background::Transparent { key },
        }
    }

    /// Build from the configuration encoding
    ///
    /// `background` is −1 for transparent or 0..=255 for opaque. When
    /// transparent, `transparent_key` picks the skipped value (default 0).
    pub fn from_raw(background: i16, transparent_key: Option<u8>) -> Result<Self, String> {
        match background {
            -1 => Ok(Self::transparent(transparent_key.unwrap_or(0))),
            0..=255 => Ok(Self::opaque(background as u8)),
            other => Err(format!("background {other} is outside -1..=255")),
        }
    }

    /// Value a widget should clear its own image to before drawing
    #[must_use]
    pub fn fill_value(&self) -> u8 {
        match self.background {
            Background::Opaque(value) => value,
            Background::Transparent { key } => key,
        }
    }

    /// Source value to skip when compositing, if any
    #[must_use]
    pub fn transparent_key(&self) -> Option<u8> {
        match self.background {
            Background::Opaque(_) => None,
            Background::Transparent { key } => Some(key),
        }
    }
}
