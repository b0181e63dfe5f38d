//! SteelClock Daemon
//!
//! Locates the app directory, loads the configuration and keeps the OLED
//! display fed until asked to stop.
//!
//! # Usage
//!
//! ```bash
//! # Config from the app directory (cwd or next to the executable)
//! steelclock
//!
//! # Explicit config file
//! steelclock -config profiles/work.json
//!
//! # Verbose logging
//! RUST_LOG=steelclock_core=debug steelclock -console
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown
//! - `SIGHUP`: Reload configuration (hot reload)

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use steelclock_core::config::{config_in_app_dir, find_app_dir, CONFIG_FILE};
use steelclock_core::{
    install_panic_hook, logging, Controller, ControllerError, DiscoveryConnector,
    FileConfigLoader, PanicLog, ReloadOutcome, WidgetRegistry,
};

use cli::{normalize_args, Args};

/// Directory holding the executable, if it can be determined
fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// App directory: cwd, then the executable's directory
///
/// Falls back to the executable's directory (or cwd) when neither holds a
/// configuration, so the log file still has a home.
async fn resolve_app_dir() -> PathBuf {
    let cwd = std::env::current_dir().ok();
    let exe = exe_dir();
    let candidates = cwd.iter().chain(exe.iter()).cloned();
    if let Some(dir) = find_app_dir(candidates).await {
        return dir;
    }
    exe.or(cwd).unwrap_or_else(|| PathBuf::from("."))
}

/// Explicit config, else the app directory's config or first profile
async fn resolve_config_path(explicit: Option<PathBuf>, app_dir: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    match config_in_app_dir(app_dir).await {
        Some(path) => path,
        None => app_dir.join(CONFIG_FILE),
    }
}

/// Handle one reload request; `Err` means the session is gone
async fn reload(controller: &Controller) -> Result<()> {
    match controller.reload().await {
        Ok(ReloadOutcome::Applied) => info!("Configuration reloaded"),
        Ok(ReloadOutcome::Reverted { error }) => {
            warn!(error = %error, "New configuration failed to start; previous configuration restored");
        }
        Err(ControllerError::Fatal(reason)) => {
            anyhow::bail!("session lost during reload: {reason}");
        }
        Err(e) => warn!(error = %e, "Reload rejected"),
    }
    Ok(())
}

/// Run until SIGINT / SIGTERM, reloading on SIGHUP
#[cfg(unix)]
async fn run(controller: &Controller) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating shutdown");
                return Ok(());
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating shutdown");
                return Ok(());
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading configuration");
                reload(controller).await?;
            }
        }
    }
}

/// Run until Ctrl-C
#[cfg(not(unix))]
async fn run(_controller: &Controller) -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C, initiating shutdown");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_from(normalize_args(std::env::args_os()));

    let app_dir = resolve_app_dir().await;
    let log_path = logging::init(&app_dir, &args.log_level)
        .with_context(|| format!("Failed to open log file in {}", app_dir.display()))?;
    install_panic_hook();

    info!("SteelClock starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        app_dir = %app_dir.display(),
        log = %log_path.display(),
        console = args.console,
        "Paths resolved"
    );

    let config_path = resolve_config_path(args.config, &app_dir).await;
    info!(config_path = %config_path.display(), "Config file");

    let connector = match args.core_props {
        Some(path) => DiscoveryConnector::with_core_props(path),
        None => DiscoveryConnector::default(),
    };
    let controller = Controller::new(
        Arc::new(FileConfigLoader::new(&config_path)),
        Arc::new(connector),
        WidgetRegistry::with_builtins(),
    )
    .with_panic_log(PanicLog::in_dir(&app_dir));

    if let Err(e) = controller.start().await {
        error!(error = %e, "Startup failed");
        return Err(e).context("SteelClock failed to start");
    }

    let result = run(&controller).await;

    info!("Shutting down...");
    match controller.stop().await {
        Ok(()) | Err(ControllerError::NotRunning) => {}
        Err(e) => warn!(error = %e, "Stop reported an error"),
    }

    match result {
        Ok(()) => {
            info!("SteelClock stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "SteelClock stopped with error");
            Err(e)
        }
    }
}
