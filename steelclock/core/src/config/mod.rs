//! Configuration
//!
//! The JSON configuration file that selects which widgets run, where they
//! sit, and how frames reach the device gateway.
//!
//! # Loading
//!
//! ```ignore
//! let config = load_config_from_path(&path).await?;
//! ```
//!
//! Every field has a default, so `{}` is a valid (empty) configuration.
//! Loading always validates; a [`Config`] obtained from
//! [`load_config_from_path`] is safe to hand to the controller.

mod app_dir;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::GameMetadata;
use crate::geometry::{Display, Position, Style, DEFAULT_THRESHOLD, MAX_DISPLAY_PIXELS};

pub use app_dir::{config_in_app_dir, find_app_dir, is_app_dir, PROFILES_DIR, CONFIG_FILE};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("failed to read config file at {path}: {source}")]
    Read {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse JSON
    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        /// The path that was parsed
        path: PathBuf,
        /// The underlying serde error
        source: serde_json::Error,
    },

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Validation(String),
}

// =============================================================================
// Defaults
// =============================================================================

/// Default game id registered with the gateway
pub const DEFAULT_GAME_NAME: &str = "STEELCLOCK";

/// Default screen event name
pub const DEFAULT_EVENT_NAME: &str = "STEELCLOCK_DISPLAY";

/// Default render loop period
pub const DEFAULT_REFRESH_RATE_MS: u64 = 100;

/// Default heartbeat period
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 10_000;

/// Default widget update interval
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 1_000;

/// Default number of frames per batched send
pub const DEFAULT_BATCH_SIZE: usize = 10;

fn default_game_name() -> String {
    DEFAULT_GAME_NAME.to_string()
}

fn default_display_name() -> String {
    "SteelClock".to_string()
}

fn default_event_name() -> String {
    DEFAULT_EVENT_NAME.to_string()
}

fn default_refresh_rate_ms() -> u64 {
    DEFAULT_REFRESH_RATE_MS
}

fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_update_interval_ms() -> u64 {
    DEFAULT_UPDATE_INTERVAL_MS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Top-level configuration
// =============================================================================

/// Application configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Game id registered with the gateway (`A-Z`, `0-9`, `-`, `_`)
    pub game_name: String,
    /// Human-readable game name
    pub game_display_name: String,
    /// Developer shown by the gateway
    pub developer: String,
    /// Gateway-side idle timeout before the game is deinitialized
    pub deinitialize_timer_length_ms: Option<u32>,
    /// Screen event frames are sent under
    pub event_name: String,
    /// Render loop period
    pub refresh_rate_ms: u64,
    /// Heartbeat period
    pub heartbeat_interval_ms: u64,
    /// Skip sends when the frame did not change
    pub frame_dedup_enabled: bool,
    /// Optional frame batching
    pub batch: BatchConfig,
    /// Call `remove_game` on stop
    pub unregister_on_exit: bool,
    /// Font override for text widgets that download one
    pub bundled_font_url: Option<String>,
    /// Display geometry
    pub display: DisplayConfig,
    /// Widgets in insertion order
    pub widgets: Vec<WidgetConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            game_name: default_game_name(),
            game_display_name: default_display_name(),
            developer: default_display_name(),
            deinitialize_timer_length_ms: None,
            event_name: default_event_name(),
            refresh_rate_ms: default_refresh_rate_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            frame_dedup_enabled: true,
            batch: BatchConfig::default(),
            unregister_on_exit: false,
            bundled_font_url: None,
            display: DisplayConfig::default(),
            widgets: Vec::new(),
        }
    }
}

impl Config {
    /// Parse and validate a JSON document
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed JSON and
    /// [`ConfigError::Validation`] on out-of-range values.
    pub fn from_json(json: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value the engine depends on
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_identifier("game_name", &self.game_name)?;
        check_identifier("event_name", &self.event_name)?;
        if let Some(event) = &self.batch.event_name {
            check_identifier("batch.event_name", event)?;
        }

        if let Some(ms) = self.deinitialize_timer_length_ms {
            if !(1_000..=60_000).contains(&ms) {
                return Err(ConfigError::Validation(format!(
                    "deinitialize_timer_length_ms must be within 1000..=60000, got {ms}"
                )));
            }
        }
        if self.refresh_rate_ms == 0 {
            return Err(ConfigError::Validation(
                "refresh_rate_ms must be greater than 0".to_string(),
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "heartbeat_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.batch.size == 0 {
            return Err(ConfigError::Validation(
                "batch.size must be greater than 0".to_string(),
            ));
        }

        self.display().validate().map_err(ConfigError::Validation)?;

        let mut seen = HashSet::new();
        for widget in self.widgets.iter().filter(|w| w.enabled) {
            widget.validate()?;
            if !seen.insert(widget.name()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate widget id '{}'",
                    widget.name()
                )));
            }
        }
        Ok(())
    }

    /// The display frames are produced for
    #[must_use]
    pub fn display(&self) -> Display {
        self.display.to_display()
    }

    /// Render loop period
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_rate_ms)
    }

    /// Heartbeat period
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Event batched frames are sent under
    #[must_use]
    pub fn batch_event_name(&self) -> &str {
        self.batch.event_name.as_deref().unwrap_or(&self.event_name)
    }

    /// Every event name the session sends frames to, deduplicated
    #[must_use]
    pub fn screen_events(&self) -> Vec<String> {
        let mut events = vec![self.event_name.clone()];
        if self.batch.enabled && self.batch_event_name() != self.event_name {
            events.push(self.batch_event_name().to_string());
        }
        events
    }

    /// Registration payload for the gateway
    #[must_use]
    pub fn game_metadata(&self) -> GameMetadata {
        GameMetadata {
            game: self.game_name.clone(),
            game_display_name: self.game_display_name.clone(),
            developer: self.developer.clone(),
            deinitialize_timer_length_ms: self.deinitialize_timer_length_ms,
        }
    }
}

fn check_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} must not be empty")));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '-' || *c == '_'))
    {
        return Err(ConfigError::Validation(format!(
            "{field} '{value}' contains '{bad}'; only A-Z, 0-9, '-' and '_' are allowed"
        )));
    }
    Ok(())
}

/// Frame batching settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Buffer frames and send them in groups
    pub enabled: bool,
    /// Frames per batched send
    pub size: usize,
    /// Event for batched sends (defaults to the top-level `event_name`)
    pub event_name: Option<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            size: default_batch_size(),
            event_name: None,
        }
    }
}

/// Display section of the configuration file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Background intensity
    pub background: u8,
    /// Encoder threshold
    pub threshold: u8,
    /// Gateway device-type override (default `screened-<W>x<H>`)
    pub resolution_token: Option<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        let display = Display::default();
        Self {
            width: display.width,
            height: display.height,
            background: display.background,
            threshold: DEFAULT_THRESHOLD,
            resolution_token: None,
        }
    }
}

impl DisplayConfig {
    /// Convert to the engine's [`Display`]
    #[must_use]
    pub fn to_display(&self) -> Display {
        Display::new(self.width, self.height)
            .with_background(self.background)
            .with_threshold(self.threshold)
    }

    /// Device-type token used when binding the screen event
    #[must_use]
    pub fn resolution_token(&self) -> String {
        self.resolution_token
            .clone()
            .unwrap_or_else(|| self.to_display().resolution_token())
    }
}

// =============================================================================
// Widget configuration
// =============================================================================

/// Widget background as written in the file (−1 = transparent)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// −1 for transparent, otherwise 0..=255
    pub background: i16,
    /// Value skipped when transparent (default 0)
    pub transparent_key: Option<u8>,
}

/// One widget entry
///
/// Everything besides the common fields is kept in `properties` and
/// interpreted by the widget's constructor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WidgetConfig {
    /// Registry tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Stable id used in logs (defaults to the type tag)
    #[serde(default)]
    pub id: Option<String>,
    /// Disabled widgets are not constructed
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Placement
    pub position: Position,
    /// Background policy
    #[serde(default)]
    pub style: StyleConfig,
    /// Cadence of `update()`
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    /// Widget-specific settings
    #[serde(flatten)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl WidgetConfig {
    /// Create an enabled widget entry with default style and interval
    pub fn new(kind: impl Into<String>, position: Position) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            enabled: true,
            position,
            style: StyleConfig::default(),
            update_interval_ms: default_update_interval_ms(),
            properties: serde_json::Map::new(),
        }
    }

    /// Set the id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the raw background (−1 = transparent)
    #[must_use]
    pub fn with_background(mut self, background: i16) -> Self {
        self.style.background = background;
        self
    }

    /// Set the update interval
    #[must_use]
    pub fn with_update_interval_ms(mut self, ms: u64) -> Self {
        self.update_interval_ms = ms;
        self
    }

    /// Set a widget-specific property
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Id if set, otherwise the type tag
    #[must_use]
    pub fn name(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.kind)
    }

    /// Resolved background policy
    ///
    /// # Errors
    ///
    /// Returns a reason when `background` is outside −1..=255.
    pub fn style(&self) -> Result<Style, String> {
        Style::from_raw(self.style.background, self.style.transparent_key)
    }

    /// Cadence of `update()`
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// Deserialize the widget-specific properties into `T`
    ///
    /// # Errors
    ///
    /// Returns the serde error message on a type mismatch.
    pub fn properties<T: DeserializeOwned>(&self) -> Result<T, String> {
        serde_json::from_value(serde_json::Value::Object(self.properties.clone()))
            .map_err(|e| e.to_string())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| {
            ConfigError::Validation(format!("widget '{}': {reason}", self.name()))
        };
        if self.position.w == 0 || self.position.h == 0 {
            return Err(invalid(format!(
                "size {}x{} must be non-empty",
                self.position.w, self.position.h
            )));
        }
        // Widget canvases are allocated per render; cap them like the display
        let pixels = u64::from(self.position.w) * u64::from(self.position.h);
        if pixels > u64::from(MAX_DISPLAY_PIXELS) {
            return Err(invalid(format!(
                "size {}x{} exceeds the {MAX_DISPLAY_PIXELS} pixel limit",
                self.position.w, self.position.h
            )));
        }
        if self.update_interval_ms == 0 {
            return Err(invalid("update_interval_ms must be greater than 0".to_string()));
        }
        self.style().map(|_| ()).map_err(invalid)
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Load and validate configuration from `path`
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
pub async fn load_config_from_path(path: &Path) -> Result<Config, ConfigError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let config = Config::from_json(&json, path)?;

    tracing::info!(
        path = %path.display(),
        widgets = config.widgets.len(),
        "Loaded configuration from file"
    );
    Ok(config)
}
