//! Device Gateway
//!
//! The vendor's local HTTP daemon that relays screen frames to the device.
//! [`Gateway`] is the seam the compositor and controller talk through;
//! [`GatewayClient`] is the HTTP implementation and
//! [`test_utils::RecordingGateway`] an in-memory double.
//!
//! # Endpoints
//!
//! | Operation | Endpoint |
//! |---|---|
//! | `register_game` | `/game_metadata` |
//! | `bind_screen_event` | `/bind_game_event` |
//! | `send_screen_data` | `/game_event` |
//! | `send_multiple_screen_data` | `/multiple_game_events` |
//! | `send_heartbeat` | `/game_heartbeat` |
//! | `remove_game` | `/remove_game` |
//!
//! The client never retries; retry policy belongs to the render loop.

mod client;
mod discovery;
mod payload;
pub mod test_utils;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::bitmap::FrameMap;

pub use client::{GatewayClient, REQUEST_TIMEOUT};
pub use discovery::{
    default_core_props_path, read_core_props, resolve_core_props_path, CoreProps,
    CORE_PROPS_ENV,
};

/// Gateway failures
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway cannot be located or reached
    #[error("device gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway answered with a non-2xx status
    #[error("{endpoint} returned HTTP {status}: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Status {
        /// Endpoint path
        endpoint: &'static str,
        /// HTTP status code
        status: u16,
        /// Reason from the response body, if any
        reason: Option<String>,
    },

    /// The request did not complete (connect, timeout, body)
    #[error("{endpoint} request failed: {source}")]
    Transport {
        /// Endpoint path
        endpoint: &'static str,
        /// Underlying HTTP client error
        source: reqwest::Error,
    },
}

impl GatewayError {
    /// HTTP status, when the gateway answered
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Registration payload for `/game_metadata`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GameMetadata {
    /// Game id
    pub game: String,
    /// Human-readable name
    pub game_display_name: String,
    /// Developer name
    pub developer: String,
    /// Idle timeout before the gateway deinitializes the game
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deinitialize_timer_length_ms: Option<u32>,
}

/// Operations the engine needs from the device gateway
///
/// Implementations must be safe to call from several tasks at once.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Game id every request is sent under
    fn game(&self) -> &str;

    /// Register (or refresh) the game
    async fn register_game(&self, metadata: &GameMetadata) -> Result<(), GatewayError>;

    /// Bind `event` as a screen handler for `resolution_token`
    ///
    /// `frame_len` sizes the blank placeholder image sent with the binding.
    async fn bind_screen_event(
        &self,
        event: &str,
        resolution_token: &str,
        frame_len: usize,
    ) -> Result<(), GatewayError>;

    /// Send one frame
    async fn send_screen_data(&self, event: &str, frames: &FrameMap) -> Result<(), GatewayError>;

    /// Send several frames in one request, in order
    async fn send_multiple_screen_data(
        &self,
        event: &str,
        frames: &[FrameMap],
    ) -> Result<(), GatewayError>;

    /// Liveness ping
    async fn send_heartbeat(&self) -> Result<(), GatewayError>;

    /// Unregister the game
    async fn remove_game(&self) -> Result<(), GatewayError>;
}
