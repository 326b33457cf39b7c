//! Controller configuration, read from environment variables.
//!
//! - `WATCH_NAMESPACE`: namespace to watch; all namespaces when unset or empty
//! - `FETCH_TIMEOUT_SECS`: per-page fetch timeout in seconds (default 30)
//! - `WATCH_BUFFER_SIZE`: snapshot channel capacity (default 100)

use crate::error::ControllerError;
use crate::watcher::DEFAULT_BUFFER_SIZE;
use std::env;
use std::time::Duration;

/// Default per-page fetch timeout
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub namespace: Option<String>,
    pub fetch_timeout: Duration,
    pub watch_buffer_size: usize,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which returns the value of a
    /// variable if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());

        let fetch_timeout = match lookup("FETCH_TIMEOUT_SECS") {
            Some(value) => {
                let secs: u64 = value.trim().parse().map_err(|_| {
                    ControllerError::InvalidConfig(format!(
                        "FETCH_TIMEOUT_SECS must be a number of seconds, got '{}'",
                        value
                    ))
                })?;
                if secs == 0 {
                    return Err(ControllerError::InvalidConfig(
                        "FETCH_TIMEOUT_SECS must be greater than zero".to_string(),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        };

        let watch_buffer_size = match lookup("WATCH_BUFFER_SIZE") {
            Some(value) => {
                let size: usize = value.trim().parse().map_err(|_| {
                    ControllerError::InvalidConfig(format!(
                        "WATCH_BUFFER_SIZE must be a positive integer, got '{}'",
                        value
                    ))
                })?;
                if size == 0 {
                    return Err(ControllerError::InvalidConfig(
                        "WATCH_BUFFER_SIZE must be greater than zero".to_string(),
                    ));
                }
                size
            }
            None => DEFAULT_BUFFER_SIZE,
        };

        Ok(Self {
            namespace,
            fetch_timeout,
            watch_buffer_size,
        })
    }
}
