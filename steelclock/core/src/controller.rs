//! Application Controller
//!
//! Owns the single active session and moves it through start, reload and
//! stop.
//!
//! # State machine
//!
//! ```text
//!            start ok                 reload ok / bad config
//! Stopped ──────────► Starting ──► Running ◄──────────────┐
//!    ▲                   │            │ reload            │
//!    │ stop              │ fail       ▼                   │
//!    └──── Running    FatalStopped  Reloading ────────────┘
//!                         ▲           │ new session fails
//!                         │           ▼
//!                         └────── Recovering ──(last good ok)──► Running
//! ```
//!
//! # Design
//!
//! - Every transition holds one async lock for its whole duration, so at
//!   most one of Starting / Reloading / Recovering is ever in progress.
//! - Reload keeps the gateway client and its registration: no
//!   `register_game`, no `remove_game`. Events are bound once per gateway
//!   and only new ones are bound on reload.
//! - [`Controller::state`] is readable while a transition runs.
//!
//! # Usage
//!
//! ```ignore
//! let controller = Controller::new(
//!     Arc::new(FileConfigLoader::new(config_path)),
//!     Arc::new(DiscoveryConnector::default()),
//!     WidgetRegistry::with_builtins(),
//! );
//! controller.start().await?;
//! match controller.reload().await? {
//!     ReloadOutcome::Applied => {}
//!     ReloadOutcome::Reverted { error } => eprintln!("{error}"),
//! }
//! controller.stop().await?;
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use crate::compositor::{Compositor, CompositorConfig};
use crate::config::{load_config_from_path, Config, ConfigError};
use crate::gateway::{Gateway, GatewayClient, GatewayError};
use crate::panic_log::PanicLog;
use crate::widget::{WidgetError, WidgetRegistry};

/// Default pause between tearing down a session and binding the next one
pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_secs(2);

/// Controller lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    /// No session
    Stopped,
    /// First session being built
    Starting,
    /// Session active
    Running,
    /// Replacing the session with a new configuration
    Reloading,
    /// Restoring the last good configuration after a failed reload
    Recovering,
    /// Startup or recovery failed; no session
    FatalStopped,
}

/// Controller failures
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Reload or stop without a running session
    #[error("no session is running")]
    NotRunning,

    /// Start while a session is running
    #[error("a session is already running")]
    AlreadyRunning,

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Gateway discovery or a registration request failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A widget could not be constructed
    #[error(transparent)]
    Widget(#[from] WidgetError),

    /// The session is gone and could not be restored
    #[error("session lost: {0}")]
    Fatal(String),
}

/// Result of a successful [`Controller::reload`]
#[derive(Debug)]
pub enum ReloadOutcome {
    /// The new configuration is live
    Applied,
    /// The new configuration failed to start; the previous one is live again
    Reverted {
        /// Why the new configuration failed
        error: ControllerError,
    },
}

/// Source of configuration for start and reload
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// Load and validate the configuration
    async fn load(&self) -> Result<Config, ConfigError>;
}

/// Loads configuration from a JSON file
#[derive(Clone, Debug)]
pub struct FileConfigLoader {
    path: PathBuf,
}

impl FileConfigLoader {
    /// Load from `path` on every start and reload
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Configuration file path
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl ConfigLoader for FileConfigLoader {
    async fn load(&self) -> Result<Config, ConfigError> {
        load_config_from_path(&self.path).await
    }
}

/// Produces the gateway a session talks to
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    /// Locate the gateway for `config`
    async fn connect(&self, config: &Config) -> Result<Arc<dyn Gateway>, GatewayError>;
}

/// Discovers the gateway through `coreProps.json`
#[derive(Clone, Debug, Default)]
pub struct DiscoveryConnector {
    core_props: Option<PathBuf>,
}

impl DiscoveryConnector {
    /// Use an explicit `coreProps.json` instead of the platform default
    pub fn with_core_props(path: impl Into<PathBuf>) -> Self {
        Self {
            core_props: Some(path.into()),
        }
    }
}

#[async_trait]
impl GatewayConnector for DiscoveryConnector {
    async fn connect(&self, config: &Config) -> Result<Arc<dyn Gateway>, GatewayError> {
        let client =
            GatewayClient::discover(self.core_props.as_deref(), config.game_name.clone()).await?;
        Ok(Arc::new(client))
    }
}

/// A shared gateway is its own connector
#[async_trait]
impl<G: Gateway + 'static> GatewayConnector for Arc<G> {
    async fn connect(&self, _config: &Config) -> Result<Arc<dyn Gateway>, GatewayError> {
        Ok(Arc::clone(self) as Arc<dyn Gateway>)
    }
}

/// Live pairing of a gateway registration and a running compositor
struct Session {
    gateway: Arc<dyn Gateway>,
    /// `(event, resolution token)` pairs bound on this gateway
    bound: HashSet<(String, String)>,
    compositor: Compositor,
    config: Config,
}

#[derive(Default)]
struct Inner {
    session: Option<Session>,
    last_good: Option<Config>,
}

/// Process-wide session owner
pub struct Controller {
    loader: Arc<dyn ConfigLoader>,
    connector: Arc<dyn GatewayConnector>,
    registry: WidgetRegistry,
    panic_log: PanicLog,
    settle_interval: Duration,
    state: RwLock<ControllerState>,
    inner: tokio::sync::Mutex<Inner>,
}

impl Controller {
    /// Create a stopped controller
    pub fn new(
        loader: Arc<dyn ConfigLoader>,
        connector: Arc<dyn GatewayConnector>,
        registry: WidgetRegistry,
    ) -> Self {
        Self {
            loader,
            connector,
            registry,
            panic_log: PanicLog::in_memory(),
            settle_interval: DEFAULT_SETTLE_INTERVAL,
            state: RwLock::new(ControllerState::Stopped),
            inner: tokio::sync::Mutex::new(Inner::default()),
        }
    }

    /// Where task panics are recorded
    #[must_use]
    pub fn with_panic_log(mut self, panic_log: PanicLog) -> Self {
        self.panic_log = panic_log;
        self
    }

    /// Pause between session teardown and rebind on reload
    #[must_use]
    pub fn with_settle_interval(mut self, settle: Duration) -> Self {
        self.settle_interval = settle;
        self
    }

    /// Current state; never waits for a transition
    #[must_use]
    pub fn state(&self) -> ControllerState {
        *self.state.read()
    }

    /// Configuration of the running session
    pub async fn active_config(&self) -> Option<Config> {
        self.inner
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.config.clone())
    }

    fn set_state(&self, next: ControllerState) {
        let mut state = self.state.write();
        if *state != next {
            tracing::debug!(from = ?*state, to = ?next, "Controller state change");
            *state = next;
        }
    }

    /// Load config, register with the gateway, and start the first session
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::AlreadyRunning`] if a session exists;
    /// any other error leaves the controller in `FatalStopped`.
    pub async fn start(&self) -> Result<(), ControllerError> {
        let mut inner = self.inner.lock().await;
        if inner.session.is_some() {
            return Err(ControllerError::AlreadyRunning);
        }
        self.set_state(ControllerState::Starting);

        match self.start_session().await {
            Ok(session) => {
                tracing::info!(
                    game = %session.config.game_name,
                    event = %session.config.event_name,
                    widgets = session.config.widgets.len(),
                    "Session started"
                );
                inner.last_good = Some(session.config.clone());
                inner.session = Some(session);
                self.set_state(ControllerState::Running);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Startup failed");
                self.set_state(ControllerState::FatalStopped);
                Err(e)
            }
        }
    }

    async fn start_session(&self) -> Result<Session, ControllerError> {
        let config = self.loader.load().await?;
        let gateway = self.connector.connect(&config).await?;
        gateway.register_game(&config.game_metadata()).await?;

        let mut bound = HashSet::new();
        bind_events(gateway.as_ref(), &mut bound, &config).await?;
        let compositor = self.launch(&gateway, &config)?;
        Ok(Session {
            gateway,
            bound,
            compositor,
            config,
        })
    }

    /// Build widgets and start a compositor on `gateway`
    fn launch(&self, gateway: &Arc<dyn Gateway>, config: &Config) -> Result<Compositor, ControllerError> {
        let widgets = self.registry.build(&config.widgets)?;
        let mut compositor = Compositor::new(
            CompositorConfig::from_config(config),
            config.display(),
            widgets,
            Arc::clone(gateway),
            self.panic_log.clone(),
        );
        compositor.start();
        Ok(compositor)
    }

    /// Bring up `config` on the retained gateway of `session`
    async fn relaunch(&self, session: &mut Session, config: &Config) -> Result<(), ControllerError> {
        let widgets = self.registry.build(&config.widgets)?;
        // Binds only pairs never bound on this gateway: A -> B -> A issues no bind for A
        bind_events(session.gateway.as_ref(), &mut session.bound, config).await?;
        let mut compositor = Compositor::new(
            CompositorConfig::from_config(config),
            config.display(),
            widgets,
            Arc::clone(&session.gateway),
            self.panic_log.clone(),
        );
        compositor.start();
        session.compositor = compositor;
        session.config = config.clone();
        Ok(())
    }

    /// Swap in a freshly loaded configuration without re-registering
    ///
    /// # Errors
    ///
    /// - [`ControllerError::NotRunning`] without a session.
    /// - [`ControllerError::Config`] if the new configuration does not load;
    ///   the running session is untouched.
    /// - [`ControllerError::Fatal`] if neither the new nor the last good
    ///   configuration could be started; the controller is `FatalStopped`.
    pub async fn reload(&self) -> Result<ReloadOutcome, ControllerError> {
        let mut inner = self.inner.lock().await;
        if inner.session.is_none() {
            return Err(ControllerError::NotRunning);
        }
        self.set_state(ControllerState::Reloading);

        let next = match self.loader.load().await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Reload rejected; keeping current session");
                self.set_state(ControllerState::Running);
                return Err(e.into());
            }
        };

        let Some(mut session) = inner.session.take() else {
            self.set_state(ControllerState::Stopped);
            return Err(ControllerError::NotRunning);
        };
        session.compositor.stop().await;
        if next.game_name != session.config.game_name {
            tracing::warn!(
                registered = %session.config.game_name,
                requested = %next.game_name,
                "game_name changes take effect after a restart"
            );
        }

        // Let the gateway finish the teardown before new bindings arrive
        tokio::time::sleep(self.settle_interval).await;

        let error = match self.relaunch(&mut session, &next).await {
            Ok(()) => {
                tracing::info!(widgets = next.widgets.len(), "Configuration reloaded");
                inner.last_good = Some(next);
                inner.session = Some(session);
                self.set_state(ControllerState::Running);
                return Ok(ReloadOutcome::Applied);
            }
            Err(e) => e,
        };

        tracing::warn!(error = %error, "New configuration failed; restoring previous one");
        self.set_state(ControllerState::Recovering);
        session.compositor.stop().await;

        let Some(previous) = inner.last_good.clone() else {
            self.set_state(ControllerState::FatalStopped);
            return Err(ControllerError::Fatal(format!(
                "{error}; no previous configuration to restore"
            )));
        };
        match self.relaunch(&mut session, &previous).await {
            Ok(()) => {
                tracing::warn!("Reverted to previous config");
                inner.session = Some(session);
                self.set_state(ControllerState::Running);
                Ok(ReloadOutcome::Reverted { error })
            }
            Err(rollback) => {
                tracing::error!(error = %error, rollback = %rollback, "Rollback failed");
                self.set_state(ControllerState::FatalStopped);
                Err(ControllerError::Fatal(format!(
                    "{error}; restoring previous configuration failed: {rollback}"
                )))
            }
        }
    }

    /// Stop the session, unregistering only if configured to
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::NotRunning`] without a session.
    pub async fn stop(&self) -> Result<(), ControllerError> {
        let mut inner = self.inner.lock().await;
        let Some(mut session) = inner.session.take() else {
            return Err(ControllerError::NotRunning);
        };
        session.compositor.stop().await;

        if session.config.unregister_on_exit {
            match session.gateway.remove_game().await {
                Ok(()) => tracing::info!(game = %session.config.game_name, "Unregistered game"),
                Err(e) => tracing::warn!(error = %e, "Failed to unregister game"),
            }
        }
        inner.last_good = None;
        self.set_state(ControllerState::Stopped);
        tracing::info!("Session stopped");
        Ok(())
    }
}

/// Bind every screen event of `config` not yet bound on this gateway
async fn bind_events(
    gateway: &dyn Gateway,
    bound: &mut HashSet<(String, String)>,
    config: &Config,
) -> Result<(), GatewayError> {
    let token = config.display.resolution_token();
    let frame_len = config.display().frame_len();
    for event in config.screen_events() {
        let key = (event, token.clone());
        if bound.contains(&key) {
            continue;
        }
        gateway.bind_screen_event(&key.0, &token, frame_len).await?;
        tracing::info!(event = %key.0, token = %token, "Bound screen event");
        bound.insert(key);
    }
    Ok(())
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state())
            .field("settle_interval", &self.settle_interval)
            .finish_non_exhaustive()
    }
}
