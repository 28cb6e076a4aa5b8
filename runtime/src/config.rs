//! Store configuration.
//!
//! Loads from environment variables with sensible defaults, or is built up
//! with the `with_*` setters.

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Environment variable for [`StoreConfig::broadcast_capacity`]
pub const BROADCAST_CAPACITY_VAR: &str = "UNFLOW_BROADCAST_CAPACITY";

/// Environment variable for [`StoreConfig::shutdown_timeout`], in milliseconds
pub const SHUTDOWN_TIMEOUT_MS_VAR: &str = "UNFLOW_SHUTDOWN_TIMEOUT_MS";

/// Environment variable for [`StoreConfig::max_dispatch_depth`]
pub const MAX_DISPATCH_DEPTH_VAR: &str = "UNFLOW_MAX_DISPATCH_DEPTH";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set but could not be parsed
    #[error("Invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable name
        key: String,
        /// Offending value
        value: String,
    },
}

/// Configuration for Store instances
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use unflow_runtime::StoreConfig;
///
/// let config = StoreConfig::default()
///     .with_broadcast_capacity(256)
///     .with_shutdown_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.broadcast_capacity, 256);
/// assert_eq!(config.max_dispatch_depth, 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Capacity of the action broadcast channel
    pub broadcast_capacity: usize,
    /// Default timeout for graceful shutdown
    pub shutdown_timeout: Duration,
    /// Longest chain of synchronously dispatched actions before the store
    /// drops the next one
    pub max_dispatch_depth: usize,
}

impl StoreConfig {
    /// Create a configuration from explicit values
    #[must_use]
    pub const fn new(
        broadcast_capacity: usize,
        shutdown_timeout: Duration,
        max_dispatch_depth: usize,
    ) -> Self {
        Self {
            broadcast_capacity,
            shutdown_timeout,
            max_dispatch_depth,
        }
    }

    /// Load from the environment, ignoring unparsable values
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            broadcast_capacity: env::var(BROADCAST_CAPACITY_VAR)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.broadcast_capacity),
            shutdown_timeout: env::var(SHUTDOWN_TIMEOUT_MS_VAR)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .map_or(defaults.shutdown_timeout, Duration::from_millis),
            max_dispatch_depth: env::var(MAX_DISPATCH_DEPTH_VAR)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.max_dispatch_depth),
        }
    }

    /// Load from the environment, rejecting unparsable values
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first variable that is set
    /// but does not parse.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::try_from_lookup(|key| env::var(key).ok())
    }

    fn try_from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            broadcast_capacity: parse_var(&lookup, BROADCAST_CAPACITY_VAR)?
                .unwrap_or(defaults.broadcast_capacity),
            shutdown_timeout: parse_var(&lookup, SHUTDOWN_TIMEOUT_MS_VAR)?
                .map_or(defaults.shutdown_timeout, Duration::from_millis),
            max_dispatch_depth: parse_var(&lookup, MAX_DISPATCH_DEPTH_VAR)?
                .unwrap_or(defaults.max_dispatch_depth),
        })
    }

    /// Set the action broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the synchronous dispatch depth limit
    #[must_use]
    pub const fn with_max_dispatch_depth(mut self, depth: usize) -> Self {
        self.max_dispatch_depth = depth;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
            shutdown_timeout: Duration::from_secs(30),
            max_dispatch_depth: 1024,
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .map(|value| {
            value.trim().parse().map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value,
            })
        })
        .transpose()
}
