//! Compositor
//!
//! Owns the two periodic activities of a running session: the render loop
//! (compose → encode → dedup → send) and the heartbeat. It also owns the
//! widget scheduler so a session starts and stops as one unit.
//!
//! # Design
//!
//! ```text
//! start:  scheduler.start() → spawn render task → spawn heartbeat task
//! stop:   cancel → join render + heartbeat → scheduler.stop()
//! ```
//!
//! - Both tasks run inside [`spawn_guarded`]. They are not restarted within
//!   a session; the next reload builds a fresh compositor.
//! - Every error inside a tick is logged and the loop continues.
//! - Cancellation is prompt, including mid-send. Buffered batch frames are
//!   dropped on stop unless the owner calls [`Compositor::flush_batch`]
//!   first.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

use crate::batch::{BatchOutcome, FrameBatcher};
use crate::bitmap::{frame_map, EncodingError, FrameEncoder};
use crate::config::{BatchConfig, Config};
use crate::dedup::FrameDeduplicator;
use crate::gateway::{Gateway, GatewayError};
use crate::geometry::Display;
use crate::layout::LayoutCompositor;
use crate::panic_log::PanicLog;
use crate::scheduler::WidgetScheduler;
use crate::task::{spawn_guarded, ShutdownSignal};
use crate::widget::Widget;

/// Failure of one render tick
#[derive(Debug, Error)]
pub enum RenderError {
    /// Canvas and display disagree
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// The frame could not be delivered
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// What one render tick did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Identical to the last accepted frame; nothing sent
    Unchanged,
    /// Sent with `send_screen_data`
    Sent,
    /// Handed to the batcher, which is still filling
    Buffered {
        /// Frames waiting
        pending: usize,
    },
    /// Completed a batch, which was sent
    BatchSent {
        /// Frames in the batch
        frames: usize,
    },
}

/// Compositor settings derived from [`Config`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositorConfig {
    /// Event single frames are sent under
    pub event_name: String,
    /// Render loop period
    pub refresh_interval: Duration,
    /// Heartbeat period
    pub heartbeat_interval: Duration,
    /// Skip unchanged frames
    pub dedup_enabled: bool,
    /// Frame batching
    pub batch: BatchConfig,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl CompositorConfig {
    /// Extract the compositor settings from a full configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut batch = config.batch.clone();
        batch.event_name = Some(config.batch_event_name().to_string());
        Self {
            event_name: config.event_name.clone(),
            refresh_interval: config.refresh_interval(),
            heartbeat_interval: config.heartbeat_interval(),
            dedup_enabled: config.frame_dedup_enabled,
            batch,
        }
    }

    /// Set the render period
    #[must_use]
    pub fn with_refresh_interval(mut self, refresh: Duration) -> Self {
        self.refresh_interval = refresh;
        self
    }

    /// Enable or disable deduplication
    #[must_use]
    pub fn with_dedup(mut self, enabled: bool) -> Self {
        self.dedup_enabled = enabled;
        self
    }

    /// Enable batching with `size` frames per batch
    #[must_use]
    pub fn with_batch(mut self, size: usize) -> Self {
        self.batch.enabled = true;
        self.batch.size = size;
        self
    }
}

/// Per-frame pipeline owned by the render task
pub struct FramePipeline {
    layout: LayoutCompositor,
    encoder: FrameEncoder,
    resolution_key: String,
    event_name: String,
    dedup: Arc<FrameDeduplicator>,
    batcher: Arc<FrameBatcher>,
    gateway: Arc<dyn Gateway>,
}

impl FramePipeline {
    /// Run one compose → encode → dedup → send cycle
    ///
    /// The deduplicator only learns a frame once the gateway has accepted
    /// it, directly or as the tail of a batch. A buffered frame is offered
    /// again on the next tick, so a static image still fills the batch.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] on an encoding mismatch or a failed send.
    pub async fn render_frame(&mut self) -> Result<FrameOutcome, RenderError> {
        let canvas = self.layout.compose();
        let bytes = self.encoder.encode(canvas)?.to_vec();
        let frames = frame_map(self.resolution_key.clone(), bytes);

        if !self.dedup.has_changed(&frames) {
            return Ok(FrameOutcome::Unchanged);
        }

        match self.batcher.add(frames.clone()).await? {
            BatchOutcome::SendDirect(frames) => {
                self.gateway
                    .send_screen_data(&self.event_name, &frames)
                    .await?;
                self.dedup.update(&frames);
                Ok(FrameOutcome::Sent)
            }
            BatchOutcome::Buffered { pending } => Ok(FrameOutcome::Buffered { pending }),
            BatchOutcome::Flushed { frames: count } => {
                self.dedup.update(&frames);
                Ok(FrameOutcome::BatchSent { frames: count })
            }
        }
    }
}

/// Render loop + heartbeat for one session
pub struct Compositor {
    config: CompositorConfig,
    display: Display,
    gateway: Arc<dyn Gateway>,
    scheduler: WidgetScheduler,
    dedup: Arc<FrameDeduplicator>,
    batcher: Arc<FrameBatcher>,
    pipeline: Option<FramePipeline>,
    panic_log: PanicLog,
    shutdown: ShutdownSignal,
    handles: Vec<JoinHandle<()>>,
}

impl Compositor {
    /// Assemble a compositor for `widgets` on `display`
    pub fn new(
        config: CompositorConfig,
        display: Display,
        widgets: Vec<Arc<dyn Widget>>,
        gateway: Arc<dyn Gateway>,
        panic_log: PanicLog,
    ) -> Self {
        let dedup = Arc::new(FrameDeduplicator::new(config.dedup_enabled));
        let batch_event = config
            .batch
            .event_name
            .clone()
            .unwrap_or_else(|| config.event_name.clone());
        let batcher = Arc::new(FrameBatcher::new(
            config.batch.enabled,
            config.batch.size,
            batch_event,
            Arc::clone(&gateway),
        ));
        let pipeline = FramePipeline {
            layout: LayoutCompositor::new(display, &widgets),
            encoder: FrameEncoder::new(display),
            resolution_key: display.resolution_key(),
            event_name: config.event_name.clone(),
            dedup: Arc::clone(&dedup),
            batcher: Arc::clone(&batcher),
            gateway: Arc::clone(&gateway),
        };
        Self {
            scheduler: WidgetScheduler::new(widgets, panic_log.clone()),
            config,
            display,
            gateway,
            dedup,
            batcher,
            pipeline: Some(pipeline),
            panic_log,
            shutdown: ShutdownSignal::new(),
            handles: Vec::new(),
        }
    }

    /// Settings in effect
    #[must_use]
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Target display
    #[must_use]
    pub fn display(&self) -> &Display {
        &self.display
    }

    /// Frame deduplicator (diagnostics)
    #[must_use]
    pub fn dedup(&self) -> &FrameDeduplicator {
        &self.dedup
    }

    /// Whether the render and heartbeat tasks have been started
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Start the scheduler, then the render and heartbeat tasks
    ///
    /// A compositor runs once; starting it again is a no-op.
    pub fn start(&mut self) {
        let Some(pipeline) = self.pipeline.take() else {
            tracing::debug!("Compositor already started");
            return;
        };
        self.scheduler.start();

        self.handles.push(spawn_guarded(
            "render",
            self.panic_log.clone(),
            render_loop(pipeline, self.config.refresh_interval, self.shutdown.clone()),
        ));
        self.handles.push(spawn_guarded(
            "heartbeat",
            self.panic_log.clone(),
            heartbeat_loop(
                Arc::clone(&self.gateway),
                self.config.heartbeat_interval,
                self.shutdown.clone(),
            ),
        ));
        tracing::info!(
            refresh_ms = self.config.refresh_interval.as_millis() as u64,
            event = %self.config.event_name,
            dedup = self.config.dedup_enabled,
            batch = self.config.batch.enabled,
            "Compositor started"
        );
    }

    /// Send any partially filled batch
    ///
    /// # Errors
    ///
    /// Returns the gateway error on a failed send.
    pub async fn flush_batch(&self) -> Result<usize, GatewayError> {
        self.batcher.flush().await
    }

    /// Cancel both tasks, wait for them, then stop the widget scheduler
    pub async fn stop(&mut self) {
        self.shutdown.trigger();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Compositor task did not finish cleanly");
            }
        }
        self.scheduler.stop().await;
        self.batcher.reset();
        tracing::info!("Compositor stopped");
    }
}

impl Drop for Compositor {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

async fn render_loop(mut pipeline: FramePipeline, period: Duration, shutdown: ShutdownSignal) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut consecutive_failures: u32 = 0;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let result = tokio::select! {
            () = shutdown.cancelled() => break,
            result = pipeline.render_frame() => result,
        };
        match result {
            Ok(outcome) => {
                if consecutive_failures > 0 {
                    tracing::info!(failures = consecutive_failures, "Frame delivery recovered");
                    consecutive_failures = 0;
                }
                tracing::trace!(?outcome, "Render tick");
            }
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures == 1 {
                    tracing::warn!(error = %e, "Render tick failed");
                } else {
                    tracing::debug!(error = %e, failures = consecutive_failures, "Render tick failed");
                }
            }
        }
    }
    tracing::debug!("Render task exiting");
}

async fn heartbeat_loop(gateway: Arc<dyn Gateway>, period: Duration, shutdown: ShutdownSignal) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            () = shutdown.cancelled() => break,
            result = gateway.send_heartbeat() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Heartbeat failed");
                }
            }
        }
    }
    tracing::debug!("Heartbeat task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::{Canvas, WHITE};
    use crate::gateway::test_utils::{GatewayOp, RecordingGateway};
    use crate::geometry::{Position, Style};
    use crate::widget::WidgetError;
    use async_trait::async_trait;

    struct Solid(u8);

    #[async_trait]
    impl Widget for Solid {
        fn name(&self) -> &str {
            "solid"
        }
        fn position(&self) -> Position {
            Position::new(0, 0, 16, 2)
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
            Ok(Some(Canvas::new(16, 2, self.0)))
        }
    }

    fn pipeline(config: &CompositorConfig, gateway: &Arc<RecordingGateway>) -> FramePipeline {
        let mut compositor = Compositor::new(
            config.clone(),
            Display::new(16, 2),
            vec![Arc::new(Solid(WHITE))],
            gateway.clone(),
            PanicLog::in_memory(),
        );
        compositor.pipeline.take().unwrap()
    }

    #[tokio::test]
    async fn test_failed_send_is_retried() {
        let gateway = Arc::new(RecordingGateway::new());
        gateway.fail(GatewayOp::SendScreenData, 1);
        let mut pipeline = pipeline(&CompositorConfig::default(), &gateway);

        assert!(pipeline.render_frame().await.is_err());
        assert_eq!(pipeline.render_frame().await.unwrap(), FrameOutcome::Sent);
        assert_eq!(pipeline.render_frame().await.unwrap(), FrameOutcome::Unchanged);
        assert_eq!(gateway.screen_frames().len(), 1);
        assert_eq!(gateway.screen_frames()[0]["image-data-16x2"], vec![0xFF; 4]);
    }

    #[tokio::test]
    async fn test_static_frame_fills_batch() {
        let gateway = Arc::new(RecordingGateway::new());
        let config = CompositorConfig::default().with_batch(2);
        let mut pipeline = pipeline(&config, &gateway);

        assert_eq!(
            pipeline.render_frame().await.unwrap(),
            FrameOutcome::Buffered { pending: 1 }
        );
        assert_eq!(
            pipeline.render_frame().await.unwrap(),
            FrameOutcome::BatchSent { frames: 2 }
        );
        assert_eq!(pipeline.render_frame().await.unwrap(), FrameOutcome::Unchanged);
        assert_eq!(gateway.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_completes() {
        let gateway = Arc::new(RecordingGateway::new());
        let config = CompositorConfig::default().with_dedup(false).with_batch(2);
        let mut pipeline = pipeline(&config, &gateway);

        assert_eq!(
            pipeline.render_frame().await.unwrap(),
            FrameOutcome::Buffered { pending: 1 }
        );
        assert_eq!(
            pipeline.render_frame().await.unwrap(),
            FrameOutcome::BatchSent { frames: 2 }
        );
        assert_eq!(gateway.batches().len(), 1);
        assert_eq!(gateway.count(GatewayOp::SendScreenData), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_is_retried() {
        let gateway = Arc::new(RecordingGateway::new());
        gateway.fail(GatewayOp::SendMultipleScreenData, 1);
        let config = CompositorConfig::default().with_batch(1);
        let mut pipeline = pipeline(&config, &gateway);

        assert!(pipeline.render_frame().await.is_err());
        // Same image again: must not be suppressed
        assert_eq!(
            pipeline.render_frame().await.unwrap(),
            FrameOutcome::BatchSent { frames: 1 }
        );
        assert_eq!(pipeline.render_frame().await.unwrap(), FrameOutcome::Unchanged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_cadence() {
        let gateway = Arc::new(RecordingGateway::new());
        let mut compositor = Compositor::new(
            CompositorConfig::default(),
            Display::new(16, 2),
            vec![Arc::new(Solid(0))],
            gateway.clone(),
            PanicLog::in_memory(),
        );
        compositor.start();
        tokio::time::sleep(Duration::from_millis(25_500)).await;
        compositor.stop().await;

        assert_eq!(gateway.count(GatewayOp::Heartbeat), 2);
        assert!(!compositor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_sends() {
        let gateway = Arc::new(RecordingGateway::new());
        let config = CompositorConfig::default()
            .with_dedup(false)
            .with_refresh_interval(Duration::from_millis(50));
        let mut compositor = Compositor::new(
            config,
            Display::new(16, 2),
            vec![Arc::new(Solid(WHITE))],
            gateway.clone(),
            PanicLog::in_memory(),
        );
        compositor.start();
        compositor.start();
        tokio::time::sleep(Duration::from_millis(120)).await;
        compositor.stop().await;

        let sent = gateway.count(GatewayOp::SendScreenData);
        assert!((2..=4).contains(&sent), "sent {sent}");
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(gateway.count(GatewayOp::SendScreenData), sent);
    }
}
