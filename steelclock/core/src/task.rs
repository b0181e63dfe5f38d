//! Cooperative Task Plumbing
//!
//! [`ShutdownSignal`] is the cancel signal every long-running task observes,
//! and [`spawn_guarded`] spawns a task inside a panic boundary.
//!
//! # Usage
//!
//! ```ignore
//! let shutdown = ShutdownSignal::new();
//! let handle = spawn_guarded("render", panic_log.clone(), {
//!     let shutdown = shutdown.clone();
//!     async move {
//!         tokio::select! {
//!             () = shutdown.cancelled() => {}
//!             () = do_work() => {}
//!         }
//!     }
//! });
//! shutdown.trigger();
//! handle.await?;
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::panic_log::{panic_message, PanicLog, PanicRecord};

/// One-shot cancel signal shared by a group of tasks
///
/// Clones observe the same signal. Once triggered it stays triggered.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Create an untriggered signal
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Fire the signal; idempotent
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has fired
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal fires
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any clone of self, so this only
        // resolves by observing `true`.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

/// Spawn `fut` so that a panic is logged instead of propagated
///
/// A panicking task writes `(timestamp, context, message, backtrace)` to
/// `panic_log` and then finishes normally; its `JoinHandle` resolves to
/// `Ok(())` either way.
pub fn spawn_guarded<F>(context: impl Into<String>, panic_log: PanicLog, fut: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let context = context.into();
    tokio::spawn(async move {
        if let Err(payload) = AssertUnwindSafe(fut).catch_unwind().await {
            let message = panic_message(payload.as_ref());
            tracing::error!(task = %context, panic = %message, "Task panicked; exiting");
            panic_log
                .record(PanicRecord::capture(context, message))
                .await;
        }
    })
}
