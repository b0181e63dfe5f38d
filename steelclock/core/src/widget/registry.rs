//! Widget factory table
//!
//! Maps a configuration `type` tag to a constructor. Populated once at
//! program start; the engine never enumerates widget kinds itself.

use std::collections::HashMap;
use std::sync::Arc;

use super::{ClockWidget, TextWidget, Widget, WidgetError};
use crate::config::WidgetConfig;

/// Builds one widget from its configuration entry
pub type WidgetConstructor =
    Arc<dyn Fn(&WidgetConfig) -> Result<Arc<dyn Widget>, WidgetError> + Send + Sync>;

/// Tag → constructor table
#[derive(Clone, Default)]
pub struct WidgetRegistry {
    constructors: HashMap<String, WidgetConstructor>,
}

impl WidgetRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `text` and `clock` widgets
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("text", |config| {
            Ok(Arc::new(TextWidget::from_config(config)?) as Arc<dyn Widget>)
        });
        registry.register("clock", |config| {
            Ok(Arc::new(ClockWidget::from_config(config)?) as Arc<dyn Widget>)
        });
        registry
    }

    /// Register (or replace) the constructor for `kind`
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&WidgetConfig) -> Result<Arc<dyn Widget>, WidgetError> + Send + Sync + 'static,
    {
        self.constructors.insert(kind.into(), Arc::new(constructor));
    }

    /// Whether `kind` has a constructor
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Registered tags, sorted
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Construct every enabled widget, in configuration order
    ///
    /// # Errors
    ///
    /// Fails on the first unknown tag or constructor error.
    pub fn build(&self, configs: &[WidgetConfig]) -> Result<Vec<Arc<dyn Widget>>, WidgetError> {
        let mut widgets = Vec::with_capacity(configs.len());
        for config in configs {
            if !config.enabled {
                tracing::debug!(widget = config.name(), "Skipping disabled widget");
                continue;
            }
            let constructor = self
                .constructors
                .get(&config.kind)
                .ok_or_else(|| WidgetError::UnknownKind(config.kind.clone()))?;
            widgets.push(constructor(config)?);
        }
        Ok(widgets)
    }
}

impl std::fmt::Debug for WidgetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
