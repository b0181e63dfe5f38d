//! Widget Scheduler
//!
//! Drives each widget's `update()` on its own cadence.
//!
//! # Design
//!
//! One long-lived task per widget:
//!
//! ```text
//! update() ── Δ ── update() ── Δ ── update() ── ... ── cancel
//! ```
//!
//! - The first `update()` runs immediately so the first frames have data.
//! - Missed ticks are skipped, never bunched up.
//! - Errors are logged and the task keeps ticking.
//! - Each task runs inside [`spawn_guarded`]; a panic is written to the
//!   panic log and only that widget stops updating.
//! - Cancellation is observed while waiting for a tick and while an
//!   `update()` is in flight.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::panic_log::PanicLog;
use crate::task::{spawn_guarded, ShutdownSignal};
use crate::widget::Widget;

/// Per-widget update driver
pub struct WidgetScheduler {
    widgets: Vec<Arc<dyn Widget>>,
    panic_log: PanicLog,
    shutdown: ShutdownSignal,
    handles: Vec<JoinHandle<()>>,
    running: bool,
}

impl WidgetScheduler {
    /// Create a scheduler for `widgets`
    #[must_use]
    pub fn new(widgets: Vec<Arc<dyn Widget>>, panic_log: PanicLog) -> Self {
        Self {
            widgets,
            panic_log,
            shutdown: ShutdownSignal::new(),
            handles: Vec::new(),
            running: false,
        }
    }

    /// Whether the widget tasks are running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Number of scheduled widgets
    #[must_use]
    pub fn widget_count(&self) -> usize {
        self.widgets.len()
    }

    /// Spawn one task per widget; no-op if already running
    pub fn start(&mut self) {
        if self.running {
            tracing::debug!("Widget scheduler already running");
            return;
        }
        self.shutdown = ShutdownSignal::new();

        for widget in &self.widgets {
            let context = format!("widget:{}", widget.name());
            let task = run_widget(Arc::clone(widget), self.shutdown.clone());
            self.handles
                .push(spawn_guarded(context, self.panic_log.clone(), task));
        }
        self.running = true;
        tracing::info!(widgets = self.widgets.len(), "Widget scheduler started");
    }

    /// Cancel all tasks, wait for them, then stop every widget
    pub async fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.shutdown.trigger();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Widget task did not finish cleanly");
            }
        }
        for widget in &self.widgets {
            widget.stop().await;
        }
        self.running = false;
        tracing::info!("Widget scheduler stopped");
    }
}

impl Drop for WidgetScheduler {
    fn drop(&mut self) {
        // Tasks must not outlive the session that owns them
        self.shutdown.trigger();
    }
}

async fn run_widget(widget: Arc<dyn Widget>, shutdown: ShutdownSignal) {
    let name = widget.name().to_string();
    let period = widget.update_interval();

    if !tick(widget.as_ref(), &name, &shutdown).await {
        return;
    }

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if !tick(widget.as_ref(), &name, &shutdown).await {
                    break;
                }
            }
        }
    }
    tracing::debug!(widget = %name, "Widget task exiting");
}

/// Run one update; returns `false` if cancelled mid-update
async fn tick(widget: &dyn Widget, name: &str, shutdown: &ShutdownSignal) -> bool {
    tokio::select! {
        () = shutdown.cancelled() => false,
        result = widget.update() => {
            if let Err(e) = result {
                tracing::warn!(widget = name, error = %e, "Widget update failed");
            }
            true
        }
    }
}
