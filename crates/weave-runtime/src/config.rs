#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! With the `config-toml` feature the configuration can be loaded from a
//! TOML document:
//!
//! ```toml
//! max_tick_rounds = 16
//! report_duplicate_keys = true
//! placeholder_text = "empty"
//!
//! [graph]
//! max_flush_rounds = 32
//! ```

use thiserror::Error;
use weave_core::GraphConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document did not parse or had unknown fields.
    #[cfg(feature = "config-toml")]
    #[error("invalid runtime configuration: {0}")]
    Toml(#[from] toml::de::Error),
    /// A field is out of range.
    #[error("`{field}` must be at least 1")]
    OutOfRange {
        /// Field name.
        field: &'static str,
    },
}

/// Tunables for a [`Runtime`](crate::Runtime).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "config-toml", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-toml", serde(default, deny_unknown_fields))]
pub struct RuntimeConfig {
    /// Graph configuration.
    pub graph: GraphConfig,
    /// Flush/update rounds one [`Runtime::tick`](crate::Runtime::tick) may run.
    pub max_tick_rounds: usize,
    /// Record duplicate list keys as [`Diagnostic`](crate::Diagnostic)s.
    pub report_duplicate_keys: bool,
    /// Text of the comment left in place of empty structural content.
    pub placeholder_text: String,
    /// Live hosts the runtime may hold; mounting beyond it fails.
    pub max_hosts: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            graph: GraphConfig::default(),
            max_tick_rounds: 32,
            report_duplicate_keys: true,
            placeholder_text: String::new(),
            max_hosts: u32::MAX,
        }
    }
}

impl RuntimeConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tick_rounds == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_tick_rounds",
            });
        }
        if self.max_hosts == 0 {
            return Err(ConfigError::OutOfRange { field: "max_hosts" });
        }
        if self.graph.max_flush_rounds == 0 {
            return Err(ConfigError::OutOfRange {
                field: "graph.max_flush_rounds",
            });
        }
        Ok(())
    }

    /// Parse and validate a TOML document. Missing fields take defaults.
    #[cfg(feature = "config-toml")]
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }
}
