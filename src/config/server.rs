//! # Server Configuration
//!
//! Settings for the metrics and health probe HTTP server.

use super::lookup_or_default;
use crate::constants::{
    DEFAULT_METRICS_PORT, DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
};
use std::time::Duration;

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// How long startup waits for the server to accept connections
    pub startup_timeout_secs: u64,
    /// Poll interval while waiting for the server
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup (environment, ConfigMap data)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            metrics_port: lookup_or_default(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
            startup_timeout_secs: lookup_or_default(
                &lookup,
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            poll_interval_ms: lookup_or_default(
                &lookup,
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
