//! Configuration Module
//!
//! Handles loading and managing node configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default listen address when `LISTEN_ADDR` is unset.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

/// Default upper bound for a single frame on the wire.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024; // 1 MiB

/// Node configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address the listener binds to
    pub listen_addr: String,
    /// Largest frame accepted or produced, header included
    pub max_frame_size: usize,
    /// Interval in milliseconds between expiry sweeps
    pub sweep_interval_ms: u64,
    /// Maximum number of expired entries removed per sweep
    pub sweep_batch_size: usize,
    /// How long a member has to acknowledge a forwarded Set, in milliseconds
    pub forward_timeout_ms: u64,
    /// Number of workers draining the fan-out queue
    pub fanout_workers: usize,
    /// Capacity of the fan-out queue
    pub fanout_queue_capacity: usize,
    /// Seed node to join at startup
    pub join_addr: Option<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `LISTEN_ADDR` - Listen address (default: 0.0.0.0:8000)
    /// - `MAX_FRAME_SIZE` - Maximum frame size in bytes (default: 1048576)
    /// - `SWEEP_INTERVAL_MS` - Expiry sweep frequency (default: 1000)
    /// - `SWEEP_BATCH_SIZE` - Entries removed per sweep at most (default: 256)
    /// - `FORWARD_TIMEOUT_MS` - Peer acknowledgement timeout (default: 2000)
    /// - `FANOUT_WORKERS` - Fan-out worker count (default: 4)
    /// - `FANOUT_QUEUE_CAPACITY` - Fan-out queue length (default: 1024)
    /// - `JOIN_ADDR` - Optional seed node address
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            max_frame_size: parse_var("MAX_FRAME_SIZE").unwrap_or(defaults.max_frame_size),
            sweep_interval_ms: parse_var("SWEEP_INTERVAL_MS")
                .unwrap_or(defaults.sweep_interval_ms),
            sweep_batch_size: parse_var("SWEEP_BATCH_SIZE").unwrap_or(defaults.sweep_batch_size),
            forward_timeout_ms: parse_var("FORWARD_TIMEOUT_MS")
                .unwrap_or(defaults.forward_timeout_ms),
            fanout_workers: parse_var("FANOUT_WORKERS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.fanout_workers),
            fanout_queue_capacity: parse_var("FANOUT_QUEUE_CAPACITY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.fanout_queue_capacity),
            join_addr: env::var("JOIN_ADDR").ok().filter(|v| !v.trim().is_empty()),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            sweep_interval_ms: 1000,
            sweep_batch_size: 256,
            forward_timeout_ms: 2000,
            fanout_workers: 4,
            fanout_queue_capacity: 1024,
            join_addr: None,
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8000");
        assert_eq!(config.max_frame_size, 1024 * 1024);
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.sweep_batch_size, 256);
        assert_eq!(config.forward_timeout(), Duration::from_secs(2));
        assert_eq!(config.fanout_workers, 4);
        assert_eq!(config.fanout_queue_capacity, 1024);
        assert!(config.join_addr.is_none());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for var in [
            "LISTEN_ADDR",
            "MAX_FRAME_SIZE",
            "SWEEP_INTERVAL_MS",
            "SWEEP_BATCH_SIZE",
            "FORWARD_TIMEOUT_MS",
            "FANOUT_WORKERS",
            "FANOUT_QUEUE_CAPACITY",
            "JOIN_ADDR",
        ] {
            env::remove_var(var);
        }

        let config = Config::from_env();
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(config.sweep_interval_ms, 1000);
        assert_eq!(config.fanout_workers, 4);
        assert!(config.join_addr.is_none());
    }
}
