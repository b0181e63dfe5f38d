//! In-memory gateway for tests
//!
//! [`RecordingGateway`] records every successful call in order and can be
//! told to fail specific operations.
//!
//! ```ignore
//! let gateway = Arc::new(RecordingGateway::new());
//! gateway.fail(GatewayOp::SendScreenData, 2);
//! // ... run the engine ...
//! assert_eq!(gateway.count(GatewayOp::RegisterGame), 1);
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{GameMetadata, Gateway, GatewayError};
use crate::bitmap::FrameMap;

/// Gateway operation kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    /// `register_game`
    RegisterGame,
    /// `bind_screen_event`
    BindScreenEvent,
    /// `send_screen_data`
    SendScreenData,
    /// `send_multiple_screen_data`
    SendMultipleScreenData,
    /// `send_heartbeat`
    Heartbeat,
    /// `remove_game`
    RemoveGame,
}

/// One recorded call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayCall {
    /// `register_game`
    RegisterGame(GameMetadata),
    /// `bind_screen_event`
    BindScreenEvent {
        /// Event name
        event: String,
        /// Device-type token
        resolution_token: String,
        /// Placeholder image length
        frame_len: usize,
    },
    /// `send_screen_data`
    SendScreenData {
        /// Event name
        event: String,
        /// Frame sent
        frames: FrameMap,
    },
    /// `send_multiple_screen_data`
    SendMultipleScreenData {
        /// Event name
        event: String,
        /// Frames sent, in order
        frames: Vec<FrameMap>,
    },
    /// `send_heartbeat`
    Heartbeat,
    /// `remove_game`
    RemoveGame,
}

impl GatewayCall {
    /// Operation kind of this call
    #[must_use]
    pub fn op(&self) -> GatewayOp {
        match self {
            Self::RegisterGame(_) => GatewayOp::RegisterGame,
            Self::BindScreenEvent { .. } => GatewayOp::BindScreenEvent,
            Self::SendScreenData { .. } => GatewayOp::SendScreenData,
            Self::SendMultipleScreenData { .. } => GatewayOp::SendMultipleScreenData,
            Self::Heartbeat => GatewayOp::Heartbeat,
            Self::RemoveGame => GatewayOp::RemoveGame,
        }
    }
}

#[derive(Default)]
struct State {
    calls: Vec<GatewayCall>,
    /// Remaining injected failures per op (`usize::MAX` = always)
    failures: HashMap<GatewayOp, usize>,
    failed: HashMap<GatewayOp, usize>,
}

/// Recording [`Gateway`] double
#[derive(Default)]
pub struct RecordingGateway {
    game: String,
    latency: Option<Duration>,
    state: Mutex<State>,
}

impl RecordingGateway {
    /// Create a gateway that accepts everything
    #[must_use]
    pub fn new() -> Self {
        Self {
            game: "STEELCLOCK".to_string(),
            ..Default::default()
        }
    }

    /// Delay every call by `latency` (simulated time under a paused clock)
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `times` calls of `op`
    pub fn fail(&self, op: GatewayOp, times: usize) {
        self.state.lock().failures.insert(op, times);
    }

    /// Fail every call of `op` until [`heal`](Self::heal)
    pub fn fail_always(&self, op: GatewayOp) {
        self.fail(op, usize::MAX);
    }

    /// Stop injecting failures
    pub fn heal(&self) {
        self.state.lock().failures.clear();
    }

    /// Every successful call, in order
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    /// Successful calls of `op`
    #[must_use]
    pub fn count(&self, op: GatewayOp) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.op() == op)
            .count()
    }

    /// Injected failures of `op` so far
    #[must_use]
    pub fn failed(&self, op: GatewayOp) -> usize {
        self.state.lock().failed.get(&op).copied().unwrap_or(0)
    }

    /// Frames from successful `send_screen_data` calls
    #[must_use]
    pub fn screen_frames(&self) -> Vec<FrameMap> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                GatewayCall::SendScreenData { frames, .. } => Some(frames.clone()),
                _ => None,
            })
            .collect()
    }

    /// Batches from successful `send_multiple_screen_data` calls
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<FrameMap>> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                GatewayCall::SendMultipleScreenData { frames, .. } => Some(frames.clone()),
                _ => None,
            })
            .collect()
    }

    /// Events bound so far, in order
    #[must_use]
    pub fn bound_events(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                GatewayCall::BindScreenEvent { event, .. } => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls
    pub fn clear(&self) {
        self.state.lock().calls.clear();
    }

    async fn handle(&self, call: GatewayCall) -> Result<(), GatewayError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let op = call.op();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(remaining) = state.failures.get_mut(&op) {
            if *remaining > 0 {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                *state.failed.entry(op).or_default() += 1;
                return Err(GatewayError::Status {
                    endpoint: endpoint_of(op),
                    status: 500,
                    reason: Some("injected failure".to_string()),
                });
            }
        }
        state.calls.push(call);
        Ok(())
    }
}

fn endpoint_of(op: GatewayOp) -> &'static str {
    match op {
        GatewayOp::RegisterGame => "/game_metadata",
        GatewayOp::BindScreenEvent => "/bind_game_event",
        GatewayOp::SendScreenData => "/game_event",
        GatewayOp::SendMultipleScreenData => "/multiple_game_events",
        GatewayOp::Heartbeat => "/game_heartbeat",
        GatewayOp::RemoveGame => "/remove_game",
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    fn game(&self) -> &str {
        &self.game
    }

    async fn register_game(&self, metadata: &GameMetadata) -> Result<(), GatewayError> {
        self.handle(GatewayCall::RegisterGame(metadata.clone()))
            .await
    }

    async fn bind_screen_event(
        &self,
        event: &str,
        resolution_token: &str,
        frame_len: usize,
    ) -> Result<(), GatewayError> {
        self.handle(GatewayCall::BindScreenEvent {
            event: event.to_string(),
            resolution_token: resolution_token.to_string(),
            frame_len,
        })
        .await
    }

    async fn send_screen_data(&self, event: &str, frames: &FrameMap) -> Result<(), GatewayError> {
        self.handle(GatewayCall::SendScreenData {
            event: event.to_string(),
            frames: frames.clone(),
        })
        .await
    }

    async fn send_multiple_screen_data(
        &self,
        event: &str,
        frames: &[FrameMap],
    ) -> Result<(), GatewayError> {
        self.handle(GatewayCall::SendMultipleScreenData {
            event: event.to_string(),
            frames: frames.to_vec(),
        })
        .await
    }

    async fn send_heartbeat(&self) -> Result<(), GatewayError> {
        self.handle(GatewayCall::Heartbeat).await
    }

    async fn remove_game(&self) -> Result<(), GatewayError> {
        self.handle(GatewayCall::RemoveGame).await
    }
}
