//! Text Rendering
//!
//! Draws UTF-8 strings with `embedded-graphics` monospace bitmap fonts.
//! Glyphs outside the font's character set render as `?`. Output is clipped
//! to the target box.

use embedded_graphics::mono_font::{ascii, MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Gray8;
use embedded_graphics::prelude::{DrawTargetExt, Point, Size};
use embedded_graphics::primitives::Rectangle;
use embedded_graphics::text::renderer::TextRenderer;
use embedded_graphics::text::{Baseline, Text};
use embedded_graphics::Drawable;
use serde::{Deserialize, Serialize};

use super::Canvas;

/// Built-in bitmap font faces
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontFace {
    /// 4x6
    Tiny,
    /// 5x8
    Small,
    /// 6x10
    #[default]
    Regular,
    /// 7x13
    Medium,
    /// 9x15
    Large,
    /// 10x20
    Huge,
}

impl FontFace {
    /// Parse a face from its name or cell size (`"regular"`, `"6x10"`)
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "tiny" | "4x6" => Some(Self::Tiny),
            "small" | "5x8" => Some(Self::Small),
            "regular" | "6x10" => Some(Self::Regular),
            "medium" | "7x13" => Some(Self::Medium),
            "large" | "9x15" => Some(Self::Large),
            "huge" | "10x20" => Some(Self::Huge),
            _ => None,
        }
    }

    fn font(self) -> &'static MonoFont<'static> {
        match self {
            Self::Tiny => &ascii::FONT_4X6,
            Self::Small => &ascii::FONT_5X8,
            Self::Regular => &ascii::FONT_6X10,
            Self::Medium => &ascii::FONT_7X13,
            Self::Large => &ascii::FONT_9X15,
            Self::Huge => &ascii::FONT_10X20,
        }
    }

    /// Pixels from the top of a line to the baseline
    #[must_use]
    pub fn ascent(self) -> u32 {
        self.font().baseline
    }

    /// Pixels from the baseline to the bottom of a line
    #[must_use]
    pub fn descent(self) -> u32 {
        self.font()
            .character_size
            .height
            .saturating_sub(self.font().baseline)
    }

    /// Full line height
    #[must_use]
    pub fn line_height(self) -> u32 {
        self.ascent() + self.descent()
    }
}

/// Horizontal placement inside the text box
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalAlign {
    /// Flush with the left edge
    #[default]
    Left,
    /// Centered
    Center,
    /// Flush with the right edge
    Right,
}

/// Vertical placement inside the text box
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAlign {
    /// Flush with the top edge
    Top,
    /// Centered
    #[default]
    Center,
    /// Flush with the bottom edge
    Bottom,
}

/// Target rectangle and alignment for [`draw_text`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextBox {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width
    pub w: u32,
    /// Height
    pub h: u32,
    /// Horizontal alignment
    pub align: HorizontalAlign,
    /// Vertical alignment
    pub valign: VerticalAlign,
}

impl TextBox {
    /// Box covering a whole canvas
    #[must_use]
    pub fn covering(canvas: &Canvas) -> Self {
        Self {
            x: 0,
            y: 0,
            w: canvas.width(),
            h: canvas.height(),
            align: HorizontalAlign::default(),
            valign: VerticalAlign::default(),
        }
    }

    /// Set both alignments
    #[must_use]
    pub fn aligned(mut self, align: HorizontalAlign, valign: VerticalAlign) -> Self {
        self.align = align;
        self.valign = valign;
        self
    }
}

/// Paint `text` into `area` of `canvas` with glyph intensity `value`
///
/// Multi-line strings are stacked using the font's ascent + descent as the
/// line height; each line is aligned independently.
pub fn draw_text(canvas: &mut Canvas, font: FontFace, text: &str, area: TextBox, value: u8) {
    let style = MonoTextStyle::new(font.font(), Gray8::new(value));
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return;
    }

    let line_height = font.line_height() as i32;
    let block_height = line_height * lines.len() as i32;
    let top = match area.valign {
        VerticalAlign::Top => area.y,
        VerticalAlign::Center => area.y + (area.h as i32 - block_height) / 2,
        VerticalAlign::Bottom => area.y + area.h as i32 - block_height,
    };

    let clip = Rectangle::new(Point::new(area.x, area.y), Size::new(area.w, area.h));
    let mut target = canvas.clipped(&clip);

    for (i, line) in lines.iter().enumerate() {
        let width = style
            .measure_string(line, Point::zero(), Baseline::Top)
            .bounding_box
            .size
            .width as i32;
        let left = match area.align {
            HorizontalAlign::Left => area.x,
            HorizontalAlign::Center => area.x + (area.w as i32 - width) / 2,
            HorizontalAlign::Right => area.x + area.w as i32 - width,
        };
        let origin = Point::new(left, top + line_height * i as i32);
        // Infallible target
        let _ = Text::with_baseline(line, origin, style, Baseline::Top).draw(&mut target);
    }
}
