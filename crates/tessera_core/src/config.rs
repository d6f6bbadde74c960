//! # World Configuration
//!
//! Loaded once when a world is created, typically from a TOML file shipped
//! with the level:
//!
//! ```toml
//! name = "level-03"
//! enable_pending_operations = true
//! entity_capacity = 65536
//! ```
//!
//! Missing keys fall back to [`WorldConfig::default`].

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading a [`WorldConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds a value the world cannot use.
    #[error("invalid configuration: `{field}` {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Configuration of one [`World`](crate::World).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Name used in log output.
    pub name: String,
    /// Buffer structural changes until `perform_pending`.
    pub enable_pending_operations: bool,
    /// Entity slots reserved up front.
    pub entity_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: "world".to_owned(),
            enable_pending_operations: false,
            entity_capacity: 1024,
        }
    }
}

impl WorldConfig {
    /// Config for worlds ticked by concurrent systems: every structural
    /// change waits for the next `perform_pending`.
    #[must_use]
    pub fn deferred() -> Self {
        Self {
            enable_pending_operations: true,
            ..Self::default()
        }
    }

    /// Sets the world name, builder style.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] when a value is out of range.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "name",
                reason: "must not be empty".to_owned(),
            });
        }
        if self.entity_capacity >= u32::MAX as usize {
            return Err(ConfigError::Invalid {
                field: "entity_capacity",
                reason: format!("must be below {}", u32::MAX),
            });
        }
        Ok(())
    }
}
