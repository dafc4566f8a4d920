//! # Configuration
//!
//! Controller and server settings, loaded from the environment at startup and
//! optionally hot-reloaded from a ConfigMap.

mod controller;
mod server;
pub mod watch;

pub use controller::ControllerConfig;
pub use server::ServerConfig;

use std::sync::Arc;
use tokio::sync::RwLock;

/// Controller configuration shared between the watch loop and the config watcher
pub type SharedControllerConfig = Arc<RwLock<ControllerConfig>>;

/// Server configuration shared between the HTTP server and the config watcher
pub type SharedServerConfig = Arc<RwLock<ServerConfig>>;

/// Parse a value from a lookup source or fall back to the default
pub(crate) fn lookup_or_default<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a boolean flag from a lookup source or return default
pub(crate) fn lookup_or_default_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            let v_lower = v.trim().to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read a string from a lookup source or return default
pub(crate) fn lookup_or_default_str<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
