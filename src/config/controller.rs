//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use super::{lookup_or_default, lookup_or_default_bool, lookup_or_default_str};
use crate::constants::{
    DEFAULT_BACKOFF_MAX_MINUTES, DEFAULT_BACKOFF_START_MINUTES, DEFAULT_CHECKOUT_CACHE_DIR,
    DEFAULT_CLUSTER_REGISTRY_NAMESPACE, DEFAULT_MAX_CONCURRENT_RECONCILES,
    DEFAULT_RECONCILE_DEBOUNCE_MS, DEFAULT_RENDER_JOB_TIMEOUT_SECS, DEFAULT_RENDER_MAX_ATTEMPTS,
    DEFAULT_RENDER_OUTPUT_DIR, DEFAULT_RENDER_PASS_TIMEOUT_SECS, DEFAULT_RENDER_RETRY_INITIAL_MS,
    DEFAULT_RENDER_RETRY_MAX_MS, DEFAULT_RENDER_WORKERS, DEFAULT_RESYNC_INTERVAL_SECS,
    DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS, DEFAULT_WATCH_RESTART_DELAY_SECS,
    MIN_RESYNC_INTERVAL_SECS,
};
use std::path::PathBuf;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Periodic resync interval for a template whose last pass succeeded (seconds)
    pub resync_interval_secs: u64,
    /// Maximum number of templates reconciled at once
    pub max_concurrent_reconciles: u16,
    /// Debounce applied by the work queue to bursts of triggers (milliseconds)
    pub reconcile_debounce_ms: u64,
    /// Fibonacci backoff lower bound after a failed pass (minutes)
    pub backoff_start_minutes: u64,
    /// Fibonacci backoff upper bound after a failed pass (minutes)
    pub backoff_max_minutes: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Render worker pool size within one pass
    pub render_workers: usize,
    /// Attempt cap per render job within one pass
    pub render_max_attempts: u32,
    /// First retry delay for a transient render failure (milliseconds)
    pub render_retry_initial_ms: u64,
    /// Retry delay cap (milliseconds)
    pub render_retry_max_ms: u64,
    /// Timeout for a single renderer invocation (seconds)
    pub render_job_timeout_secs: u64,
    /// Wall-clock bound on one reconcile pass (seconds)
    pub render_pass_timeout_secs: u64,
    /// Namespace of the ArgoCD cluster secrets
    pub cluster_registry_namespace: String,
    /// Root for git checkouts
    pub checkout_cache_dir: PathBuf,
    /// Root for rendered manifests
    pub render_output_dir: PathBuf,
    pub helm_binary: String,
    pub kustomize_binary: String,
    pub git_binary: String,
    /// Namespace where the controller is deployed (ConfigMap hot-reload lookup)
    pub controller_namespace: String,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Enable color in text format logs
    pub log_enable_color: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Out-of-range values are clamped: the resync interval never drops below
    /// `MIN_RESYNC_INTERVAL_SECS`, worker and attempt counts never drop below one,
    /// and backoff bounds are reordered when inverted.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let backoff_start_minutes = lookup_or_default(
            &lookup,
            "BACKOFF_START_MINUTES",
            DEFAULT_BACKOFF_START_MINUTES,
        )
        .max(1);
        let backoff_max_minutes =
            lookup_or_default(&lookup, "BACKOFF_MAX_MINUTES", DEFAULT_BACKOFF_MAX_MINUTES)
                .max(backoff_start_minutes);
        let render_retry_initial_ms = lookup_or_default(
            &lookup,
            "RENDER_RETRY_INITIAL_MS",
            DEFAULT_RENDER_RETRY_INITIAL_MS,
        );

        Self {
            resync_interval_secs: lookup_or_default(
                &lookup,
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            )
            .max(MIN_RESYNC_INTERVAL_SECS),
            max_concurrent_reconciles: lookup_or_default(
                &lookup,
                "MAX_CONCURRENT_RECONCILES",
                DEFAULT_MAX_CONCURRENT_RECONCILES,
            )
            .max(1),
            reconcile_debounce_ms: lookup_or_default(
                &lookup,
                "RECONCILE_DEBOUNCE_MS",
                DEFAULT_RECONCILE_DEBOUNCE_MS,
            ),
            backoff_start_minutes,
            backoff_max_minutes,
            watch_restart_delay_secs: lookup_or_default(
                &lookup,
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: lookup_or_default(
                &lookup,
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            render_workers: lookup_or_default(&lookup, "RENDER_WORKERS", DEFAULT_RENDER_WORKERS)
                .max(1),
            render_max_attempts: lookup_or_default(
                &lookup,
                "RENDER_MAX_ATTEMPTS",
                DEFAULT_RENDER_MAX_ATTEMPTS,
            )
            .max(1),
            render_retry_initial_ms,
            render_retry_max_ms: lookup_or_default(
                &lookup,
                "RENDER_RETRY_MAX_MS",
                DEFAULT_RENDER_RETRY_MAX_MS,
            )
            .max(render_retry_initial_ms),
            render_job_timeout_secs: lookup_or_default(
                &lookup,
                "RENDER_JOB_TIMEOUT_SECS",
                DEFAULT_RENDER_JOB_TIMEOUT_SECS,
            )
            .max(1),
            render_pass_timeout_secs: lookup_or_default(
                &lookup,
                "RENDER_PASS_TIMEOUT_SECS",
                DEFAULT_RENDER_PASS_TIMEOUT_SECS,
            )
            .max(1),
            cluster_registry_namespace: lookup_or_default_str(
                &lookup,
                "CLUSTER_REGISTRY_NAMESPACE",
                DEFAULT_CLUSTER_REGISTRY_NAMESPACE,
            ),
            checkout_cache_dir: PathBuf::from(lookup_or_default_str(
                &lookup,
                "CHECKOUT_CACHE_DIR",
                DEFAULT_CHECKOUT_CACHE_DIR,
            )),
            render_output_dir: PathBuf::from(lookup_or_default_str(
                &lookup,
                "RENDER_OUTPUT_DIR",
                DEFAULT_RENDER_OUTPUT_DIR,
            )),
            helm_binary: lookup_or_default_str(&lookup, "HELM_BINARY", "helm"),
            kustomize_binary: lookup_or_default_str(&lookup, "KUSTOMIZE_BINARY", "kustomize"),
            git_binary: lookup_or_default_str(&lookup, "GIT_BINARY", "git"),
            controller_namespace: lookup_or_default_str(
                &lookup,
                "POD_NAMESPACE",
                "application-template-system",
            ),
            log_level: lookup_or_default_str(&lookup, "LOG_LEVEL", "INFO"),
            log_format: lookup_or_default_str(&lookup, "LOG_FORMAT", "json"),
            log_enable_color: lookup_or_default_bool(&lookup, "LOG_ENABLE_COLOR", false),
        }
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn reconcile_debounce(&self) -> Duration {
        Duration::from_millis(self.reconcile_debounce_ms)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }

    pub fn render_job_timeout(&self) -> Duration {
        Duration::from_secs(self.render_job_timeout_secs)
    }

    pub fn render_pass_timeout(&self) -> Duration {
        Duration::from_secs(self.render_pass_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = ControllerConfig::default();
        assert_eq!(config.resync_interval_secs, DEFAULT_RESYNC_INTERVAL_SECS);
        assert_eq!(config.render_workers, DEFAULT_RENDER_WORKERS);
        assert_eq!(config.render_max_attempts, DEFAULT_RENDER_MAX_ATTEMPTS);
        assert_eq!(config.cluster_registry_namespace, "argocd");
        assert_eq!(config.helm_binary, "helm");
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("RENDER_WORKERS", "16"),
            ("HELM_BINARY", "/usr/local/bin/helm"),
            ("LOG_ENABLE_COLOR", "yes"),
        ]));
        assert_eq!(config.render_workers, 16);
        assert_eq!(config.helm_binary, "/usr/local/bin/helm");
        assert!(config.log_enable_color);
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("RENDER_WORKERS", "many"),
            ("RESYNC_INTERVAL_SECS", "-5"),
        ]));
        assert_eq!(config.render_workers, DEFAULT_RENDER_WORKERS);
        assert_eq!(config.resync_interval_secs, DEFAULT_RESYNC_INTERVAL_SECS);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("RESYNC_INTERVAL_SECS", "1"),
            ("RENDER_WORKERS", "0"),
            ("RENDER_MAX_ATTEMPTS", "0"),
            ("BACKOFF_START_MINUTES", "5"),
            ("BACKOFF_MAX_MINUTES", "2"),
            ("RENDER_RETRY_INITIAL_MS", "1000"),
            ("RENDER_RETRY_MAX_MS", "10"),
        ]));
        assert_eq!(config.resync_interval_secs, MIN_RESYNC_INTERVAL_SECS);
        assert_eq!(config.render_workers, 1);
        assert_eq!(config.render_max_attempts, 1);
        assert_eq!(config.backoff_max_minutes, 5);
        assert_eq!(config.render_retry_max_ms, 1000);
    }
}
