//! Widget manager configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors loading a [`ManagerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings for a [`crate::WidgetManager`].
///
/// ```toml
/// require_connected_container = true
/// retry_failed_modules = true
/// root_class = "jupyter-widgets"
///
/// [aliases]
/// "jupyter-js-widgets" = "@jupyter-widgets/controls"
/// ```
///
/// No aliases are set by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Refuse to mount into containers that are not attached to a document.
    pub require_connected_container: bool,
    /// Evict failed module resolutions so later renders try again.
    pub retry_failed_modules: bool,
    /// Class added to every scoped view element.
    pub root_class: String,
    /// Module name aliases applied before lookup.
    pub aliases: BTreeMap<String, String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            require_connected_container: true,
            retry_failed_modules: true,
            root_class: "jupyter-widgets".to_string(),
            aliases: BTreeMap::new(),
        }
    }
}

impl ManagerConfig {
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let toml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&toml)
    }

    #[must_use]
    pub const fn with_connected_container(mut self, required: bool) -> Self {
        self.require_connected_container = required;
        self
    }

    #[must_use]
    pub const fn with_retry_failed_modules(mut self, retry: bool) -> Self {
        self.retry_failed_modules = retry;
        self
    }

    #[must_use]
    pub fn with_root_class(mut self, class: impl Into<String>) -> Self {
        self.root_class = class.into();
        self
    }

    #[must_use]
    pub fn with_alias(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.aliases.insert(from.into(), to.into());
        self
    }
}
