//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::reconciler::{BackoffState, Reconciler, ReconcilerError};
use crate::crd::ApplicationTemplate;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff is tracked per template; the retry time is recorded so the next
/// event for the template runs as a retry rather than being skipped.
pub fn handle_reconciliation_error(
    template: Arc<ApplicationTemplate>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = template.name_any();
    let namespace = template.namespace().unwrap_or_else(|| "default".to_string());

    let error_span = tracing::error_span!(
        "controller.reconciliation_error",
        resource.name = %name,
        resource.namespace = %namespace,
    );
    let _error_guard = error_span.enter();

    error!(error = %error, "Reconciliation error");
    observability::metrics::increment_reconciliation_errors();

    // Config is behind an async lock; the configured bounds only shape new states
    let (start_minutes, max_minutes) = ctx
        .config
        .try_read()
        .map(|c| (c.backoff_start_minutes, c.backoff_max_minutes))
        .unwrap_or((
            crate::constants::DEFAULT_BACKOFF_START_MINUTES,
            crate::constants::DEFAULT_BACKOFF_MAX_MINUTES,
        ));

    let key = format!("{namespace}/{name}");
    let (backoff, error_count) = {
        let mut states = ctx
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let state = states
            .entry(key)
            .or_insert_with(|| BackoffState::new(start_minutes, max_minutes));
        state.increment_error();
        let backoff = state.backoff.next_backoff();
        state.retry_at = chrono::Duration::from_std(backoff)
            .ok()
            .map(|d| chrono::Utc::now() + d);
        (backoff, state.error_count)
    };

    info!(
        retry_in_secs = backoff.as_secs(),
        error_count,
        "Retrying with Fibonacci backoff (trigger source: retry-after-failure)"
    );
    Action::requeue(backoff)
}

/// Handle watch stream errors with classification and backoff
///
/// Returns `None` to filter the error out (the stream restarts) or `Some(())`
/// to keep the item.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff_ms: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> Option<()> {
    let error_span = tracing::warn_span!("controller.watch.error", error = %error_string);
    let _error_guard = error_span.enter();

    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    let is_401 =
        (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found;
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone");
    let is_429 = error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests");

    if is_401 {
        error!(
            "Watch authentication failed (401 Unauthorized) - check the controller's ClusterRole grants list/watch on applicationtemplates and secrets"
        );
        tokio::time::sleep(watch_restart_delay).await;
        None
    } else if is_410 {
        warn!("Watch resource version expired (410), watch will restart");
        None
    } else if is_429 {
        let current = backoff_ms.load(Ordering::Relaxed);
        warn!(
            backoff_ms = current,
            "API server storage reinitializing (429), backing off before restart"
        );
        tokio::time::sleep(Duration::from_millis(current)).await;
        backoff_ms.store(current.saturating_mul(2).min(max_backoff_ms), Ordering::Relaxed);
        None
    } else if is_not_found {
        warn!(
            "Resource not found (404) - normal when a template was deleted, otherwise check the CRD is installed: {}",
            error_string
        );
        Some(())
    } else {
        error!("Controller stream error: {}", error_string);
        tokio::time::sleep(watch_restart_delay).await;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_410_restarts_without_delay() {
        let backoff = Arc::new(AtomicU64::new(100));
        let result = handle_watch_stream_error(
            "Api error: too old resource version (410)",
            &backoff,
            1_000,
            Duration::from_secs(5),
        )
        .await;
        assert!(result.is_none());
        assert_eq!(backoff.load(Ordering::Relaxed), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_doubles_backoff_up_to_cap() {
        let backoff = Arc::new(AtomicU64::new(600));
        let result = handle_watch_stream_error("429 TooManyRequests", &backoff, 1_000, Duration::from_secs(5)).await;
        assert!(result.is_none());
        assert_eq!(backoff.load(Ordering::Relaxed), 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_keeps_stream() {
        let backoff = Arc::new(AtomicU64::new(100));
        let result = handle_watch_stream_error("ObjectNotFound", &backoff, 1_000, Duration::from_secs(5)).await;
        assert_eq!(result, Some(()));
    }
}
