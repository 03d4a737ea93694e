//! Engine and runtime configuration.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. Optional JSON config file
//! 3. Environment variables (`BUSROUTE_*`)
//!
//! Each layer overrides the previous.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::route::FIXED_MINUTES_PER_STOP;

/// Environment variable overriding [`EngineConfig::minutes_per_stop`].
pub const ENV_MINUTES_PER_STOP: &str = "BUSROUTE_MINUTES_PER_STOP";
/// Environment variable overriding [`EngineConfig::present_on_create`].
pub const ENV_PRESENT_ON_CREATE: &str = "BUSROUTE_PRESENT_ON_CREATE";
/// Environment variable overriding [`EngineConfig::memoize_routes`].
pub const ENV_MEMOIZE_ROUTES: &str = "BUSROUTE_MEMOIZE_ROUTES";
/// Environment variable overriding [`RuntimeConfig::queue_capacity`].
pub const ENV_QUEUE_CAPACITY: &str = "BUSROUTE_QUEUE_CAPACITY";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse config file.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Invalid environment variable value.
    #[error("invalid value for environment variable '{name}': {message}")]
    InvalidEnvVar {
        /// Variable name.
        name: String,
        /// What was wrong.
        message: String,
    },

    /// A value is out of its allowed range.
    #[error("invalid config value '{field}': {message}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// What was wrong.
        message: String,
    },
}

impl ConfigError {
    fn invalid_env_var(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Engine behavior knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minutes between consecutive stops for the fixed-interval strategy.
    pub minutes_per_stop: u32,
    /// Presence of a new student when the draft does not say.
    pub present_on_create: bool,
    /// Cache routes between reads.
    pub memoize_routes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            minutes_per_stop: FIXED_MINUTES_PER_STOP,
            present_on_create: true,
            memoize_routes: true,
        }
    }
}

impl EngineConfig {
    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a zero stop interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.minutes_per_stop == 0 {
            return Err(ConfigError::InvalidValue {
                field: "minutes_per_stop",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Single-writer runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum queued commands.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// Combined configuration file layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusrouteConfig {
    /// Engine settings.
    pub engine: EngineConfig,
    /// Runtime settings.
    pub runtime: RuntimeConfig,
}

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```
/// use busroute::config::ConfigLoader;
///
/// let config = ConfigLoader::new().skip_env_vars().load().unwrap();
/// assert_eq!(config.engine.minutes_per_stop, 5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    skip_env: bool,
}

impl ConfigLoader {
    /// Creates a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON config file as the second layer.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Skips environment variable loading.
    #[must_use]
    pub const fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Loads and validates the configuration.
    ///
    /// # Errors
    ///
    /// File, parse, environment or range failures.
    pub fn load(&self) -> Result<BusrouteConfig, ConfigError> {
        let mut config = match &self.file {
            Some(path) => load_file(path)?,
            None => BusrouteConfig::default(),
        };

        if !self.skip_env {
            apply_vars(&mut config, |name| std::env::var(name).ok())?;
        }

        config.engine.validate()?;
        Ok(config)
    }
}

fn load_file(path: &Path) -> Result<BusrouteConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Applies `BUSROUTE_*` overrides read through `lookup`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] for unparseable values.
pub fn apply_vars<F>(config: &mut BusrouteConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(ENV_MINUTES_PER_STOP) {
        config.engine.minutes_per_stop = val
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid_env_var(ENV_MINUTES_PER_STOP, "expected integer"))?;
        debug!(minutes_per_stop = config.engine.minutes_per_stop, "env override");
    }
    if let Some(val) = lookup(ENV_PRESENT_ON_CREATE) {
        config.engine.present_on_create = parse_bool(&val)
            .ok_or_else(|| ConfigError::invalid_env_var(ENV_PRESENT_ON_CREATE, "expected bool"))?;
    }
    if let Some(val) = lookup(ENV_MEMOIZE_ROUTES) {
        config.engine.memoize_routes = parse_bool(&val)
            .ok_or_else(|| ConfigError::invalid_env_var(ENV_MEMOIZE_ROUTES, "expected bool"))?;
    }
    if let Some(val) = lookup(ENV_QUEUE_CAPACITY) {
        config.runtime.queue_capacity = val
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid_env_var(ENV_QUEUE_CAPACITY, "expected integer"))?;
    }
    Ok(())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
