//! Frame Batcher
//!
//! Optionally groups N encoded frames into one `send_multiple_screen_data`
//! request.
//!
//! # Design
//!
//! ```text
//! add ──► [ f1 f2 .. fN ] ──(full)──► take under lock ──► ticket k ──► send in ticket order
//! ```
//!
//! - The buffer lock covers only the append, the size check and the swap;
//!   it is never held across the HTTP request.
//! - Every taken batch draws a ticket under the same lock. Sends wait for
//!   their ticket, so batches reach the gateway in the order they filled.
//! - A batch is gone once taken, whether or not its send succeeds.
//! - A send future dropped mid-flight gives up its turn without stalling
//!   later batches.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::bitmap::FrameMap;
use crate::gateway::{Gateway, GatewayError};

/// Encoded frame plus the time it was produced
#[derive(Clone, Debug)]
pub struct FingerprintedFrame {
    /// Encoded frames by resolution key
    pub frames: FrameMap,
    /// When the render loop produced it
    pub produced_at: Instant,
}

impl FingerprintedFrame {
    /// Stamp `frames` with the current time
    #[must_use]
    pub fn now(frames: FrameMap) -> Self {
        Self {
            frames,
            produced_at: Instant::now(),
        }
    }
}

/// What [`FrameBatcher::add`] did with a frame
#[derive(Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Batching is disabled; the caller sends the frame itself
    SendDirect(FrameMap),
    /// The frame is waiting in the buffer
    Buffered {
        /// Frames now in the buffer
        pending: usize,
    },
    /// The buffer filled and was sent
    Flushed {
        /// Frames in the sent batch
        frames: usize,
    },
}

#[derive(Default)]
struct State {
    buffer: Vec<FingerprintedFrame>,
    next_ticket: u64,
    now_serving: u64,
    /// Tickets whose send was dropped before its turn
    abandoned: BTreeSet<u64>,
}

/// N-frame buffer in front of the gateway
pub struct FrameBatcher {
    enabled: bool,
    size: usize,
    event_name: String,
    gateway: Arc<dyn Gateway>,
    state: Mutex<State>,
    turn: watch::Sender<u64>,
}

impl FrameBatcher {
    /// Create a batcher sending `size`-frame batches to `event_name`
    pub fn new(
        enabled: bool,
        size: usize,
        event_name: impl Into<String>,
        gateway: Arc<dyn Gateway>,
    ) -> Self {
        let (turn, _) = watch::channel(0);
        Self {
            enabled,
            size: size.max(1),
            event_name: event_name.into(),
            gateway,
            state: Mutex::new(State::default()),
            turn,
        }
    }

    /// Disabled batcher: every frame is sent directly
    #[must_use]
    pub fn disabled(gateway: Arc<dyn Gateway>) -> Self {
        Self::new(false, 1, String::new(), gateway)
    }

    /// Whether frames are buffered
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Event batches are sent under
    #[must_use]
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Frames currently buffered
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Buffer a frame, sending the batch if it is now full
    ///
    /// # Errors
    ///
    /// Returns the gateway error if a triggered batch send fails; the batch
    /// is discarded either way.
    pub async fn add(&self, frames: FrameMap) -> Result<BatchOutcome, GatewayError> {
        if !self.enabled {
            return Ok(BatchOutcome::SendDirect(frames));
        }

        let (batch, ticket) = {
            let mut state = self.state.lock();
            state.buffer.push(FingerprintedFrame::now(frames));
            if state.buffer.len() < self.size {
                return Ok(BatchOutcome::Buffered {
                    pending: state.buffer.len(),
                });
            }
            take_batch(&mut state)
        };

        let count = batch.len();
        self.send_in_turn(batch, ticket).await?;
        Ok(BatchOutcome::Flushed { frames: count })
    }

    /// Send whatever is buffered; returns the number of frames sent
    ///
    /// # Errors
    ///
    /// Returns the gateway error on a failed send; the frames are discarded.
    pub async fn flush(&self) -> Result<usize, GatewayError> {
        if !self.enabled {
            return Ok(0);
        }
        let (batch, ticket) = {
            let mut state = self.state.lock();
            if state.buffer.is_empty() {
                return Ok(0);
            }
            take_batch(&mut state)
        };
        let count = batch.len();
        self.send_in_turn(batch, ticket).await?;
        Ok(count)
    }

    /// Drop buffered frames without sending
    pub fn reset(&self) {
        let dropped = std::mem::take(&mut self.state.lock().buffer).len();
        if dropped > 0 {
            tracing::debug!(dropped, "Discarded buffered frames");
        }
    }

    async fn send_in_turn(
        &self,
        batch: Vec<FingerprintedFrame>,
        ticket: u64,
    ) -> Result<(), GatewayError> {
        let mut turn = Turn {
            batcher: self,
            ticket,
            started: false,
        };
        let mut rx = self.turn.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|serving| *serving == ticket).await;
        turn.started = true;

        if let Some(oldest) = batch.first() {
            tracing::debug!(
                frames = batch.len(),
                oldest_ms = oldest.produced_at.elapsed().as_millis() as u64,
                "Sending frame batch"
            );
        }
        let frames: Vec<FrameMap> = batch.into_iter().map(|f| f.frames).collect();
        self.gateway
            .send_multiple_screen_data(&self.event_name, &frames)
            .await
    }

    /// Pass the turn on from `ticket`, skipping abandoned tickets
    fn finish_turn(&self, state: &mut State, ticket: u64) {
        let mut next = ticket + 1;
        while state.abandoned.remove(&next) {
            next += 1;
        }
        state.now_serving = next;
        self.turn.send_replace(next);
    }
}

fn take_batch(state: &mut State) -> (Vec<FingerprintedFrame>, u64) {
    let ticket = state.next_ticket;
    state.next_ticket += 1;
    (std::mem::take(&mut state.buffer), ticket)
}

/// Releases a send turn when the send finishes or is dropped
struct Turn<'a> {
    batcher: &'a FrameBatcher,
    ticket: u64,
    started: bool,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        let mut state = self.batcher.state.lock();
        if self.started || state.now_serving == self.ticket {
            self.batcher.finish_turn(&mut *state, self.ticket);
        } else {
            state.abandoned.insert(self.ticket);
        }
    }
}

impl std::fmt::Debug for FrameBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBatcher")
            .field("enabled", &self.enabled)
            .field("size", &self.size)
            .field("event_name", &self.event_name)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
