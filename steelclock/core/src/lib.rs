//! SteelClock Core - OLED Widget Compositor for SteelSeries Devices
//!
//! This crate renders a configurable set of widgets into a 1-bit frame for
//! a 128×40 OLED panel and streams it to the local SteelSeries device
//! gateway over HTTP, several times a second.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         Controller                             │
//! │   load config ─► connect gateway ─► register + bind ─► session │
//! └───────────────────────────────┬────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┼────────────────────────────────┐
//! │                         Compositor                              │
//! │                                                                 │
//! │  WidgetScheduler          render task             heartbeat    │
//! │  ┌──────────────┐   ┌───────────────────────┐   ┌───────────┐  │
//! │  │ update() per │   │ LayoutCompositor      │   │ every 10s │  │
//! │  │ widget task  │──►│  ─► FrameEncoder      │   └─────┬─────┘  │
//! │  └──────────────┘   │  ─► FrameDeduplicator │         │        │
//! │                     │  ─► FrameBatcher      │         │        │
//! │                     └───────────┬───────────┘         │        │
//! └─────────────────────────────────┼─────────────────────┼────────┘
//!                                   ▼                     ▼
//!                          Gateway (GatewayClient over reqwest)
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use steelclock_core::{
//!     Controller, DiscoveryConnector, FileConfigLoader, WidgetRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let controller = Controller::new(
//!         Arc::new(FileConfigLoader::new("config.json")),
//!         Arc::new(DiscoveryConnector::default()),
//!         WidgetRegistry::with_builtins(),
//!     );
//!     controller.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     controller.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`geometry`]: Display, widget position and style types
//! - [`bitmap`]: Grayscale canvas, text drawing and the 1-bpp encoder
//! - [`widget`]: The `Widget` trait, built-in widgets and the factory
//! - [`layout`]: Z-ordered compositing of widget images
//! - [`scheduler`]: One periodic update task per widget
//! - [`dedup`]: Suppresses frames identical to the last accepted one
//! - [`batch`]: Optional N-frame batching in front of the gateway
//! - [`gateway`]: Device-gateway client, discovery and a test double
//! - [`compositor`]: Render and heartbeat tasks for one session
//! - [`controller`]: Start / reload / rollback / stop state machine
//! - [`config`]: JSON configuration and app-directory lookup
//! - [`logging`]: stderr + rolling file subscriber
//! - [`panic_log`]: Panic capture for supervised tasks
//! - [`task`]: Shutdown signal and panic-guarded spawning

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod bitmap;
pub mod compositor;
pub mod config;
pub mod controller;
pub mod dedup;
pub mod gateway;
pub mod geometry;
pub mod layout;
pub mod logging;
pub mod panic_log;
pub mod scheduler;
pub mod task;
pub mod widget;

// Re-export commonly used types
pub use batch::{BatchOutcome, FrameBatcher};
pub use bitmap::{encode, Canvas, EncodingError, FrameEncoder, FrameMap};
pub use compositor::{Compositor, CompositorConfig, FrameOutcome, RenderError};
pub use config::{load_config_from_path, Config, ConfigError, WidgetConfig};
pub use controller::{
    ConfigLoader, Controller, ControllerError, ControllerState, DiscoveryConnector,
    FileConfigLoader, GatewayConnector, ReloadOutcome,
};
pub use dedup::FrameDeduplicator;
pub use gateway::{GameMetadata, Gateway, GatewayClient, GatewayError};
pub use geometry::{Background, Display, Position, Style};
pub use layout::LayoutCompositor;
pub use panic_log::{install_panic_hook, PanicLog};
pub use scheduler::WidgetScheduler;
pub use task::{spawn_guarded, ShutdownSignal};
pub use widget::{Widget, WidgetError, WidgetRegistry};
