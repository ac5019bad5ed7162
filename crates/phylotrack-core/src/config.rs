//! Configuration for a systematics manager.
//!
//! The flags decide which taxa the engine keeps once they stop being active
//! and whether organisms are addressed by [`WorldPosition`]. They are fixed
//! when the manager is constructed. Configurations can be written inline or
//! loaded from YAML:
//!
//! ```yaml
//! store_active: true
//! store_ancestors: true
//! store_outside: false
//! store_position: true
//! track_synchronous: false
//! ```
//!
//! [`WorldPosition`]: phylotrack_types::WorldPosition

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Retention and addressing flags for a systematics manager.
///
/// Every field has a default, so an empty YAML document yields the default
/// configuration.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystematicsConfig {
    /// List taxa with living organisms in the active set. Turning this off
    /// leaves every statistic over active taxa at its empty value.
    #[serde(default = "default_true")]
    pub store_active: bool,

    /// List extinct taxa that still have living descendants in the ancestor
    /// set. When off, such taxa are kept only as structural links.
    #[serde(default = "default_true")]
    pub store_ancestors: bool,

    /// Keep pruned taxa (extinct, with no living descendants) in the outside
    /// set instead of freeing them.
    #[serde(default)]
    pub store_outside: bool,

    /// Allow organisms to be addressed by position.
    #[serde(default)]
    pub store_position: bool,

    /// The population has synchronous generations: [`update`] retires
    /// population 0 and promotes population 1 in its place.
    ///
    /// [`update`]: crate::Systematics::update
    #[serde(default)]
    pub track_synchronous: bool,
}

impl Default for SystematicsConfig {
    fn default() -> Self {
        Self {
            store_active: true,
            store_ancestors: true,
            store_outside: false,
            store_position: false,
            track_synchronous: false,
        }
    }
}

impl SystematicsConfig {
    /// Build a configuration from the four retention/addressing flags, in
    /// the order `store_active, store_ancestors, store_outside,
    /// store_position`.
    pub const fn new(
        store_active: bool,
        store_ancestors: bool,
        store_outside: bool,
        store_position: bool,
    ) -> Self {
        Self {
            store_active,
            store_ancestors,
            store_outside,
            store_position,
            track_synchronous: false,
        }
    }

    /// Return a copy with position tracking switched on or off.
    #[must_use]
    pub const fn with_store_position(mut self, enabled: bool) -> Self {
        self.store_position = enabled;
        self
    }

    /// Return a copy with synchronous-generation tracking switched on or off.
    #[must_use]
    pub const fn with_track_synchronous(mut self, enabled: bool) -> Self {
        self.track_synchronous = enabled;
        self
    }

    /// Whether any extinct taxa are archived (`store_ancestors ||
    /// store_outside`).
    pub const fn store_archive(&self) -> bool {
        self.store_ancestors || self.store_outside
    }

    /// The subset of flags the registry needs for pruning decisions.
    pub const fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            store_active: self.store_active,
            store_ancestors: self.store_ancestors,
            store_outside: self.store_outside,
        }
    }

    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }
}

/// Which non-active taxa the registry keeps.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// List active taxa in the active set.
    pub store_active: bool,
    /// List extinct taxa with living descendants in the ancestor set.
    pub store_ancestors: bool,
    /// Keep pruned taxa in the outside set.
    pub store_outside: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        SystematicsConfig::default().retention()
    }
}

const fn default_true() -> bool {
    true
}
