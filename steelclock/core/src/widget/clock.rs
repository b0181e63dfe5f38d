//! Clock widget
//!
//! Formats local time with a `chrono` strftime pattern on every `update()`.
//! `render()` draws whatever the last update produced.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;

use super::text::{Common, TextLook, TextProps};
use super::{Widget, WidgetError};
use crate::bitmap::Canvas;
use crate::config::WidgetConfig;
use crate::geometry::{Position, Style};

/// Default strftime pattern
pub const DEFAULT_CLOCK_FORMAT: &str = "%H:%M:%S";

/// Draws the current local time
pub struct ClockWidget {
    common: Common,
    look: TextLook,
    format: String,
    /// Last formatted time, empty until the first update
    current: Mutex<String>,
}

impl ClockWidget {
    /// Build from a `clock` widget entry
    ///
    /// # Errors
    ///
    /// Returns [`WidgetError::InvalidConfig`] for a bad style, font or
    /// format string.
    pub fn from_config(config: &WidgetConfig) -> Result<Self, WidgetError> {
        let common = Common::from_config(config)?;
        let props: TextProps = config
            .properties()
            .map_err(|reason| WidgetError::invalid(&common.name, reason))?;
        let look = TextLook::from_props(&common.name, &props)?;
        let format = props
            .format
            .unwrap_or_else(|| DEFAULT_CLOCK_FORMAT.to_string());
        if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
            return Err(WidgetError::invalid(
                &common.name,
                format!("invalid time format '{format}'"),
            ));
        }
        Ok(Self {
            common,
            look,
            format,
            current: Mutex::new(String::new()),
        })
    }

    /// Format `now` with this widget's pattern
    fn format_time<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<String, WidgetError>
    where
        Tz::Offset: std::fmt::Display,
    {
        let mut out = String::new();
        write!(out, "{}", now.format(&self.format))
            .map_err(|_| WidgetError::update(&self.common.name, "time formatting failed"))?;
        Ok(out)
    }

    /// Text currently shown
    #[must_use]
    pub fn current(&self) -> String {
        self.current.lock().clone()
    }
}

#[async_trait]
impl Widget for ClockWidget {
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
        let text = self.format_time(&Local::now())?;
        *self.current.lock() = text;
        Ok(())
    }

    fn render(&self) -> Result<Option<Canvas>, WidgetError> {
        let text = self.current.lock().clone();
        Ok(Some(self.look.paint(
            self.common.position,
            self.common.style,
            &text,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_format_time() {
        let config = WidgetConfig::new("clock", Position::new(0, 0, 128, 40))
            .with_property("format", json!("%H-%M"));
        let widget = ClockWidget::from_config(&config).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 7, 5, 0).unwrap();
        assert_eq!(widget.format_time(&at).unwrap(), "07-05");
    }

    #[test]
    fn test_invalid_format_rejected() {
        let config = WidgetConfig::new("clock", Position::new(0, 0, 128, 40))
            .with_property("format", json!("%Q"));
        assert!(matches!(
            ClockWidget::from_config(&config),
            Err(WidgetError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_then_render() {
        let config = WidgetConfig::new("clock", Position::new(0, 0, 128, 40));
        let widget = ClockWidget::from_config(&config).unwrap();
        assert_eq!(widget.current(), "");

        widget.update().await.unwrap();
        assert_eq!(widget.current().len(), "00:00:00".len());
        let canvas = widget.render().unwrap().unwrap();
        assert_eq!((canvas.width(), canvas.height()), (128, 40));
    }
}
