//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `application_template_reconciliations_total` - Reconcile passes started, by trigger
//! - `application_template_reconciliation_errors_total` - Passes that ended in an error
//! - `application_template_reconciliation_duration_seconds` - Wall-clock time of a pass
//! - `application_template_render_jobs_total` - Render jobs by kind and result
//! - `application_template_render_duration_seconds` - Render job duration by kind
//! - `application_template_render_retries_total` - Transient render retries by kind
//! - `application_template_checkouts_total` - Git checkouts performed
//! - `application_template_checkout_errors_total` - Git checkouts that failed
//! - `application_template_checkout_duration_seconds` - Git checkout duration
//! - `application_template_registry_errors_total` - Cluster registry listing failures
//! - `application_template_matched_clusters` - Clusters matched in the last pass, per template
//! - `application_template_stale_rendered_files` - Stale entries retained, per template

use anyhow::Result;
use prometheus::{
    Histogram, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "application_template_reconciliations_total",
            "Total number of reconcile passes by trigger",
        ),
        &["trigger"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "application_template_reconciliation_errors_total",
        "Total number of reconcile passes that ended in an error",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "application_template_reconciliation_duration_seconds",
            "Duration of reconcile passes in seconds",
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static RENDER_JOBS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "application_template_render_jobs_total",
            "Total number of render jobs by kind and result",
        ),
        &["kind", "result"],
    )
    .expect("Failed to create RENDER_JOBS_TOTAL metric - this should never happen")
});

static RENDER_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "application_template_render_duration_seconds",
            "Duration of render jobs in seconds by kind",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 120.0]),
        &["kind"],
    )
    .expect("Failed to create RENDER_DURATION metric - this should never happen")
});

static RENDER_RETRIES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "application_template_render_retries_total",
            "Total number of transient render failures that were retried",
        ),
        &["kind"],
    )
    .expect("Failed to create RENDER_RETRIES_TOTAL metric - this should never happen")
});

static CHECKOUTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "application_template_checkouts_total",
        "Total number of git checkouts",
    )
    .expect("Failed to create CHECKOUTS_TOTAL metric - this should never happen")
});

static CHECKOUT_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "application_template_checkout_errors_total",
        "Total number of failed git checkouts",
    )
    .expect("Failed to create CHECKOUT_ERRORS_TOTAL metric - this should never happen")
});

static CHECKOUT_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "application_template_checkout_duration_seconds",
            "Duration of git checkouts in seconds",
        )
        .buckets(vec![0.5, 1.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("Failed to create CHECKOUT_DURATION metric - this should never happen")
});

static REGISTRY_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "application_template_registry_errors_total",
        "Total number of cluster registry listing failures",
    )
    .expect("Failed to create REGISTRY_ERRORS_TOTAL metric - this should never happen")
});

static MATCHED_CLUSTERS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "application_template_matched_clusters",
            "Distinct clusters matched by the last pass",
        ),
        &["namespace", "name"],
    )
    .expect("Failed to create MATCHED_CLUSTERS metric - this should never happen")
});

static STALE_RENDERED_FILES: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "application_template_stale_rendered_files",
            "Rendered files retained from an earlier pass because their job failed",
        ),
        &["namespace", "name"],
    )
    .expect("Failed to create STALE_RENDERED_FILES metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Registration only fails on duplicate registration"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(RENDER_JOBS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RENDER_DURATION.clone()))?;
    REGISTRY.register(Box::new(RENDER_RETRIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CHECKOUTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CHECKOUT_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CHECKOUT_DURATION.clone()))?;
    REGISTRY.register(Box::new(REGISTRY_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MATCHED_CLUSTERS.clone()))?;
    REGISTRY.register(Box::new(STALE_RENDERED_FILES.clone()))?;
    Ok(())
}

pub fn increment_reconciliations(trigger: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[trigger]).inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn record_render_job(kind: &str, success: bool, duration: f64) {
    let result = if success { "success" } else { "failure" };
    RENDER_JOBS_TOTAL.with_label_values(&[kind, result]).inc();
    RENDER_DURATION.with_label_values(&[kind]).observe(duration);
}

pub fn increment_render_retries(kind: &str) {
    RENDER_RETRIES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_checkouts_total() {
    CHECKOUTS_TOTAL.inc();
}

pub fn increment_checkout_errors_total() {
    CHECKOUT_ERRORS_TOTAL.inc();
}

pub fn observe_checkout_duration(duration: f64) {
    CHECKOUT_DURATION.observe(duration);
}

pub fn increment_registry_errors() {
    REGISTRY_ERRORS_TOTAL.inc();
}

pub fn set_template_gauges(namespace: &str, name: &str, matched_clusters: usize, stale_files: usize) {
    MATCHED_CLUSTERS
        .with_label_values(&[namespace, name])
        .set(i64::try_from(matched_clusters).unwrap_or(i64::MAX));
    STALE_RENDERED_FILES
        .with_label_values(&[namespace, name])
        .set(i64::try_from(stale_files).unwrap_or(i64::MAX));
}

/// Drop per-template series once the template is deleted
pub fn remove_template_gauges(namespace: &str, name: &str) {
    let _ = MATCHED_CLUSTERS.remove_label_values(&[namespace, name]);
    let _ = STALE_RENDERED_FILES.remove_label_values(&[namespace, name]);
}
