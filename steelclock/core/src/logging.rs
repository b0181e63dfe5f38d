//! Logging setup
//!
//! Two `tracing-subscriber` layers: human-readable output on stderr and an
//! append-only `steelclock.log` in the app directory. The file is rolled
//! once, at startup, when it has grown past [`MAX_LOG_BYTES`].
//!
//! `RUST_LOG` overrides the default filter.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log file name inside the app directory
pub const LOG_FILE: &str = "steelclock.log";

/// Size above which the log is rolled to `steelclock.log.1`
pub const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;

/// Default filter for `level`
#[must_use]
pub fn default_filter(level: &str) -> String {
    format!("steelclock={level},steelclock_core={level}")
}

/// Move `path` to `<path>.1` if it is larger than `max_bytes`
///
/// Returns `true` if the file was rolled.
///
/// # Errors
///
/// Returns the I/O error if the rename fails.
pub fn roll_if_oversized(path: &Path, max_bytes: u64) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > max_bytes => {
            let mut rolled = path.as_os_str().to_owned();
            rolled.push(".1");
            fs::rename(path, PathBuf::from(rolled))?;
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Install the global subscriber; returns the log file path
///
/// # Errors
///
/// Returns the I/O error if the log file cannot be rolled or opened.
pub fn init(app_dir: &Path, level: &str) -> io::Result<PathBuf> {
    let path = app_dir.join(LOG_FILE);
    let rolled = roll_if_oversized(&path, MAX_LOG_BYTES)?;
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(true);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    // A subscriber already installed (tests, embedding) is not an error
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    if rolled {
        tracing::info!(path = %path.display(), "Rolled oversized log file");
    }
    Ok(path)
}
