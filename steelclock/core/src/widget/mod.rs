//! Widget Contract
//!
//! Every content producer on the display implements [`Widget`]. The engine
//! only ever talks to widgets through this trait; concrete kinds are built
//! from configuration by the [`WidgetRegistry`].
//!
//! # Concurrency
//!
//! `update()` is driven by the widget's own scheduler task and `render()` by
//! the render loop, so the two may run at the same time. Widgets guard their
//! state with their own lock (usually one `parking_lot::Mutex` per widget).
//!
//! # Usage
//!
//! ```ignore
//! let registry = WidgetRegistry::with_builtins();
//! let widgets = registry.build(&config.widgets)?;
//! ```

mod clock;
mod registry;
mod text;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::bitmap::Canvas;
use crate::geometry::{Position, Style};

pub use clock::ClockWidget;
pub use registry::{WidgetConstructor, WidgetRegistry};
pub use text::{TextProps, TextWidget};

/// Widget-scoped failures
#[derive(Debug, Error)]
pub enum WidgetError {
    /// Refreshing widget data failed (transient)
    #[error("widget '{widget}' update failed: {reason}")]
    Update {
        /// Widget name
        widget: String,
        /// What went wrong
        reason: String,
    },

    /// Producing the widget image failed (transient)
    #[error("widget '{widget}' render failed: {reason}")]
    Render {
        /// Widget name
        widget: String,
        /// What went wrong
        reason: String,
    },

    /// No constructor registered for the configured type tag
    #[error("unknown widget type '{0}'")]
    UnknownKind(String),

    /// Widget configuration is unusable
    #[error("invalid config for widget '{widget}': {reason}")]
    InvalidConfig {
        /// Widget id or type
        widget: String,
        /// What is wrong with it
        reason: String,
    },
}

impl WidgetError {
    /// Shorthand for [`WidgetError::Update`]
    pub fn update(widget: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Update {
            widget: widget.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`WidgetError::Render`]
    pub fn render(widget: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Render {
            widget: widget.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`WidgetError::InvalidConfig`]
    pub fn invalid(widget: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            widget: widget.into(),
            reason: reason.into(),
        }
    }
}

/// Capability set every widget exposes
#[async_trait]
pub trait Widget: Send + Sync {
    /// Stable id used in logs
    fn name(&self) -> &str;

    /// Placement on the display; may only change between `update()` calls
    fn position(&self) -> Position;

    /// Background policy
    fn style(&self) -> Style;

    /// Cadence at which the scheduler calls `update()` (positive)
    fn update_interval(&self) -> Duration;

    /// Refresh widget data
    ///
    /// Must not block indefinitely; any I/O needs its own timeout.
    async fn update(&self) -> Result<(), WidgetError>;

    /// Produce an image of exactly `position().w` x `position().h`
    ///
    /// `Ok(None)` hides the widget for this frame.
    fn render(&self) -> Result<Option<Canvas>, WidgetError>;

    /// Release background resources; called once the scheduler has drained
    async fn stop(&self) {}
}
