//! Layout Compositor
//!
//! Paints every widget's image onto one display-sized canvas per frame.
//!
//! # Design
//!
//! - Widgets are stable-sorted by ascending `z` once at construction; equal
//!   `z` keeps configuration order. A configuration change builds a new
//!   compositor.
//! - The output canvas is allocated once and refilled with the display
//!   background every frame.
//! - A widget that errors, panics, or returns an image of the wrong size is
//!   skipped for that frame; the rest of the frame still composes.

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::bitmap::Canvas;
use crate::geometry::Display;
use crate::panic_log::panic_message;
use crate::widget::Widget;

/// Z-ordered widget compositor
pub struct LayoutCompositor {
    display: Display,
    widgets: Vec<Arc<dyn Widget>>,
    canvas: Canvas,
    /// Widgets already reported for a size mismatch
    mismatch_reported: HashSet<String>,
}

impl LayoutCompositor {
    /// Create a compositor for `widgets` on `display`
    #[must_use]
    pub fn new(display: Display, widgets: &[Arc<dyn Widget>]) -> Self {
        let mut widgets = widgets.to_vec();
        // sort_by_key is stable
        widgets.sort_by_key(|w| w.position().z);
        Self {
            canvas: Canvas::new(display.width, display.height, display.background),
            display,
            widgets,
            mismatch_reported: HashSet::new(),
        }
    }

    /// Target display
    #[must_use]
    pub fn display(&self) -> &Display {
        &self.display
    }

    /// Widget names in paint order
    #[must_use]
    pub fn paint_order(&self) -> Vec<&str> {
        self.widgets.iter().map(|w| w.name()).collect()
    }

    /// Compose one frame and borrow the result
    pub fn compose(&mut self) -> &Canvas {
        self.canvas.fill(self.display.background);

        for widget in &self.widgets {
            let name = widget.name();
            let rendered = match catch_unwind(AssertUnwindSafe(|| widget.render())) {
                Ok(Ok(Some(image))) => image,
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => {
                    tracing::warn!(widget = name, error = %e, "Widget render failed; skipping");
                    continue;
                }
                Err(payload) => {
                    tracing::error!(
                        widget = name,
                        panic = %panic_message(payload.as_ref()),
                        "Widget render panicked; skipping"
                    );
                    continue;
                }
            };

            let position = widget.position();
            if rendered.width() != position.w || rendered.height() != position.h {
                if self.mismatch_reported.insert(name.to_string()) {
                    tracing::warn!(
                        widget = name,
                        expected = %format!("{}x{}", position.w, position.h),
                        actual = %format!("{}x{}", rendered.width(), rendered.height()),
                        "Widget image size mismatch; skipping"
                    );
                }
                continue;
            }

            self.canvas.draw_sub(
                &rendered,
                position.x,
                position.y,
                widget.style().transparent_key(),
            );
        }

        &self.canvas
    }
}

impl std::fmt::Debug for LayoutCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutCompositor")
            .field("display", &self.display)
            .field("widgets", &self.paint_order())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::WHITE;
    use crate::geometry::{Position, Style};
    use crate::widget::WidgetError;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Renders a fixed image
    struct Fixed {
        name: &'static str,
        position: Position,
        style: Style,
        image: Option<Canvas>,
    }

    impl Fixed {
        fn solid(name: &'static str, position: Position, style: Style, value: u8) -> Self {
            Self {
                name,
                position,
                style,
                image: Some(Canvas::new(position.w, position.h, value)),
            }
        }
    }

    #[async_trait]
    impl Widget for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn position(&self) -> Position {
            self.position
        }
        fn style(&self) -> Style {
            self.style
        }
        fn update_interval(&self) -> Duration {
            Duration::from_secs(1)
        }
        async fn update(&self) -> Result<(), WidgetError> {
            Ok(())
        }
        fn render(&self) -> Result<Option<Canvas>, WidgetError> {
            Ok(self.image.clone())
        }
    }

    struct Panicking;

    #[async_trait]
    impl Widget for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }
        fn position(&self) -> Position {
            Position::new(0, 0, 8, 8)
        }
        fn style(&self) -> Style {
            Style::opaque(0)
        }
        fn update_interval(&self) -> Duration {
            Duration::from_secs(1)
        }
        async fn update(&self) -> Result<(), WidgetError> {
            Ok(())
        }
        fn render(&self) -> Result<Option<Canvas>, WidgetError> {
            panic!("render exploded")
        }
    }

    fn arc(widget: impl Widget + 'static) -> Arc<dyn Widget> {
        Arc::new(widget)
    }

    #[test]
    fn test_background_only() {
        let display = Display::new(16, 4).with_background(9);
        let mut layout = LayoutCompositor::new(display, &[]);
        assert!(layout.compose().pixels().iter().all(|&p| p == 9));
    }

    #[test]
    fn test_z_order_and_transparency() {
        let display = Display::default();
        let a = Fixed::solid("a", Position::new(0, 0, 128, 40), Style::opaque(0), 0x40);

        let mut b_image = Canvas::new(64, 20, 0);
        b_image.fill_rect(32, 0, 32, 20, WHITE);
        let b = Fixed {
            name: "b",
            position: Position::new(32, 10, 64, 20).with_z(1),
            style: Style::transparent(0),
            image: Some(b_image),
        };

        // Insert the higher z first; construction must reorder
        let mut layout = LayoutCompositor::new(display, &[arc(b), arc(a)]);
        assert_eq!(layout.paint_order(), vec!["a", "b"]);

        let canvas = layout.compose();
        assert_eq!(canvas.get(40, 15), Some(0x40));
        assert_eq!(canvas.get(80, 15), Some(WHITE));
        assert_eq!(canvas.get(0, 0), Some(0x40));
    }

    #[test]
    fn test_equal_z_keeps_insertion_order() {
        let display = Display::new(8, 1);
        let first = Fixed::solid("first", Position::new(0, 0, 8, 1), Style::opaque(0), 1);
        let second = Fixed::solid("second", Position::new(0, 0, 8, 1), Style::opaque(0), 2);
        let mut layout = LayoutCompositor::new(display, &[arc(first), arc(second)]);
        assert_eq!(layout.compose().get(0, 0), Some(2));
    }

    #[test]
    fn test_opaque_overwrites_with_zero() {
        let display = Display::new(8, 1);
        let low = Fixed::solid("low", Position::new(0, 0, 8, 1), Style::opaque(0), WHITE);
        let high = Fixed::solid("high", Position::new(0, 0, 4, 1).with_z(1), Style::opaque(0), 0);
        let mut layout = LayoutCompositor::new(display, &[arc(low), arc(high)]);
        let canvas = layout.compose();
        assert_eq!(canvas.get(0, 0), Some(0));
        assert_eq!(canvas.get(4, 0), Some(WHITE));
    }

    #[test]
    fn test_clipped_widget() {
        let display = Display::new(16, 8);
        let w = Fixed::solid("edge", Position::new(-4, 6, 8, 8), Style::opaque(0), WHITE);
        let mut layout = LayoutCompositor::new(display, &[arc(w)]);
        let canvas = layout.compose();
        let lit = canvas.pixels().iter().filter(|&&p| p == WHITE).count();
        // x 0..4, y 6..8
        assert_eq!(lit, 8);
        assert_eq!(canvas.get(3, 7), Some(WHITE));
    }

    #[test]
    fn test_bad_widgets_are_skipped() {
        let display = Display::new(8, 8);
        let wrong_size = Fixed {
            name: "wrong",
            position: Position::new(0, 0, 8, 8),
            style: Style::opaque(0),
            image: Some(Canvas::new(4, 4, WHITE)),
        };
        let hidden = Fixed {
            name: "hidden",
            position: Position::new(0, 0, 8, 8),
            style: Style::opaque(0),
            image: None,
        };
        let good = Fixed::solid("good", Position::new(0, 0, 2, 2).with_z(5), Style::opaque(0), 7);

        let mut layout = LayoutCompositor::new(
            display,
            &[arc(wrong_size), arc(hidden), arc(Panicking), arc(good)],
        );
        for _ in 0..2 {
            let canvas = layout.compose();
            assert_eq!(canvas.get(0, 0), Some(7));
            assert_eq!(canvas.get(5, 5), Some(0));
        }
        assert!(layout.mismatch_reported.contains("wrong"));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let display = Display::default();
        let w = Fixed::solid("w", Position::new(10, 10, 20, 20), Style::opaque(3), 200);
        let mut layout = LayoutCompositor::new(display, &[arc(w)]);
        let first = layout.compose().clone();
        assert_eq!(&first, layout.compose());
    }
}
