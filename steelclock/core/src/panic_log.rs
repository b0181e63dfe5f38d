//! Panic Log
//!
//! Append-only record of task panics: timestamp, task context, panic message
//! and the backtrace captured at the panic site.
//!
//! # Backtraces
//!
//! By the time `catch_unwind` hands back the payload the stack is gone, so
//! [`install_panic_hook`] captures a backtrace inside the hook and parks it in
//! thread-local storage. The task guard runs on the same worker thread and
//! picks it up with [`take_backtrace`].

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

/// File name used inside the app directory
pub const PANIC_LOG_FILE: &str = "panic.log";

/// Records kept in memory for diagnostics
const MAX_RECENT: usize = 64;

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Install a process panic hook that stashes the panic-site backtrace
///
/// The previous hook still runs afterwards.
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let trace = Backtrace::force_capture().to_string();
        LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(trace));
        previous(info);
    }));
}

/// Take the backtrace stashed by the most recent panic on this thread
#[must_use]
pub fn take_backtrace() -> Option<String> {
    LAST_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

/// Best-effort text of a panic payload
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// One captured panic
#[derive(Clone, Debug)]
pub struct PanicRecord {
    /// When the panic was caught
    pub timestamp: DateTime<Local>,
    /// Task that panicked, e.g. `widget:clock`
    pub context: String,
    /// Panic message
    pub message: String,
    /// Backtrace from the panic site, if the hook was installed
    pub backtrace: Option<String>,
}

impl PanicRecord {
    /// Build a record for a panic that just unwound on this thread
    pub fn capture(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            context: context.into(),
            message: message.into(),
            backtrace: take_backtrace(),
        }
    }

    fn render(&self) -> String {
        let mut entry = format!(
            "[{}] task={} panic={}\n",
            self.timestamp.to_rfc3339(),
            self.context,
            self.message
        );
        match &self.backtrace {
            Some(trace) => entry.push_str(trace),
            None => entry.push_str("<no backtrace captured>"),
        }
        entry.push_str("\n\n");
        entry
    }
}

struct Inner {
    path: Option<PathBuf>,
    recent: Mutex<Vec<PanicRecord>>,
}

/// Shared panic sink
#[derive(Clone)]
pub struct PanicLog {
    inner: Arc<Inner>,
}

impl PanicLog {
    /// Append to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::build(Some(path.into()))
    }

    /// `panic.log` inside `dir`
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(PANIC_LOG_FILE))
    }

    /// Keep records in memory only
    #[must_use]
    pub fn in_memory() -> Self {
        Self::build(None)
    }

    fn build(path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path,
                recent: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Backing file, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Most recent records, oldest first
    #[must_use]
    pub fn recent(&self) -> Vec<PanicRecord> {
        self.inner.recent.lock().clone()
    }

    /// Store `record` and append it to the file
    ///
    /// File errors are logged, never returned.
    pub async fn record(&self, record: PanicRecord) {
        let entry = record.render();
        {
            let mut recent = self.inner.recent.lock();
            if recent.len() == MAX_RECENT {
                recent.remove(0);
            }
            recent.push(record);
        }

        let Some(path) = &self.inner.path else {
            return;
        };
        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(entry.as_bytes()).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = result {
            tracing::error!(path = %path.display(), error = %e, "Failed to write panic log");
        }
    }
}

impl std::fmt::Debug for PanicLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanicLog")
            .field("path", &self.inner.path)
            .field("recent", &self.inner.recent.lock().len())
            .finish()
    }
}
