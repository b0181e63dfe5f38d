//! Static text widget

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{Widget, WidgetError};
use crate::bitmap::{draw_text, Canvas, FontFace, HorizontalAlign, TextBox, VerticalAlign, WHITE};
use crate::config::WidgetConfig;
use crate::geometry::{Position, Style};

/// Text appearance shared by the text-drawing widgets
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct TextProps {
    /// Literal text (`text` widget)
    pub text: Option<String>,
    /// strftime format (`clock` widget)
    pub format: Option<String>,
    /// Font face name or cell size, e.g. `"6x10"`
    pub font: Option<String>,
    /// Horizontal alignment
    pub align: HorizontalAlign,
    /// Vertical alignment
    pub valign: VerticalAlign,
    /// Glyph intensity (default 255)
    pub color: Option<u8>,
}

/// Resolved text appearance
#[derive(Clone, Copy, Debug)]
pub(crate) struct TextLook {
    pub font: FontFace,
    pub align: HorizontalAlign,
    pub valign: VerticalAlign,
    pub color: u8,
}

impl TextLook {
    pub(crate) fn from_props(name: &str, props: &TextProps) -> Result<Self, WidgetError> {
        let font = match props.font.as_deref() {
            None => FontFace::default(),
            Some(face) => FontFace::parse(face)
                .ok_or_else(|| WidgetError::invalid(name, format!("unknown font '{face}'")))?,
        };
        Ok(Self {
            font,
            align: props.align,
            valign: props.valign,
            color: props.color.unwrap_or(WHITE),
        })
    }

    /// Draw `text` onto a fresh widget-sized canvas
    pub(crate) fn paint(&self, position: Position, style: Style, text: &str) -> Canvas {
        let mut canvas = Canvas::new(position.w, position.h, style.fill_value());
        let area = TextBox::covering(&canvas).aligned(self.align, self.valign);
        draw_text(&mut canvas, self.font, text, area, self.color);
        canvas
    }
}

/// Fields every widget takes from its [`WidgetConfig`]
#[derive(Clone, Debug)]
pub(crate) struct Common {
    pub name: String,
    pub position: Position,
    pub style: Style,
    pub interval: Duration,
}

impl Common {
    pub(crate) fn from_config(config: &WidgetConfig) -> Result<Self, WidgetError> {
        let name = config.name().to_string();
        let style = config
            .style()
            .map_err(|reason| WidgetError::invalid(&name, reason))?;
        Ok(Self {
            position: config.position,
            style,
            interval: config.update_interval(),
            name,
        })
    }
}

/// Draws a fixed string
pub struct TextWidget {
    common: Common,
    look: TextLook,
    text: String,
}

impl TextWidget {
    /// Build from a `text` widget entry
    ///
    /// # Errors
    ///
    /// Returns [`WidgetError::InvalidConfig`] for a bad style or font.
    pub fn from_config(config: &WidgetConfig) -> Result<Self, WidgetError> {
        let common = Common::from_config(config)?;
        let props: TextProps = config
            .properties()
            .map_err(|reason| WidgetError::invalid(&common.name, reason))?;
        let look = TextLook::from_props(&common.name, &props)?;
        Ok(Self {
            text: props.text.unwrap_or_default(),
            common,
            look,
        })
    }
}

#[async_trait]
impl Widget for TextWidget {
    fn name(&self) -> &str {
        &self.common.name
    }

    fn position(&self) -> Position {
        self.common.position
    }

    fn style(&self) -> Style {
        self.common.style
    }

    fn update_interval(&self) -> Duration {
        self.common.interval
    }

    async fn update(&self) -> Result<(), WidgetError> {
        Ok(())
    }

    fn render(&self) -> Result<Option<Canvas>, WidgetError> {
        Ok(Some(self.look.paint(
            self.common.position,
            self.common.style,
            &self.text,
        )))
    }
}
