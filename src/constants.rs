//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default periodic resync interval for a healthy template (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Minimum resync interval (seconds)
/// Shorter intervals hammer the git remote and chart repositories
pub const MIN_RESYNC_INTERVAL_SECS: u64 = 30;

/// Default number of templates reconciled concurrently
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 8;

/// Default debounce applied to re-enqueued template keys (milliseconds)
pub const DEFAULT_RECONCILE_DEBOUNCE_MS: u64 = 500;

/// Default Fibonacci backoff lower bound for failed passes (minutes)
pub const DEFAULT_BACKOFF_START_MINUTES: u64 = 1;

/// Default Fibonacci backoff upper bound for failed passes (minutes)
pub const DEFAULT_BACKOFF_MAX_MINUTES: u64 = 10;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Default size of the per-pass render worker pool
pub const DEFAULT_RENDER_WORKERS: usize = 4;

/// Default attempt cap for a single render job within one pass
pub const DEFAULT_RENDER_MAX_ATTEMPTS: u32 = 3;

/// Default initial retry delay for transient render failures (milliseconds)
pub const DEFAULT_RENDER_RETRY_INITIAL_MS: u64 = 500;

/// Default retry delay cap for transient render failures (milliseconds)
pub const DEFAULT_RENDER_RETRY_MAX_MS: u64 = 8_000;

/// Default timeout for one renderer invocation (seconds)
pub const DEFAULT_RENDER_JOB_TIMEOUT_SECS: u64 = 120;

/// Default wall-clock bound on one reconcile pass (seconds)
pub const DEFAULT_RENDER_PASS_TIMEOUT_SECS: u64 = 600;

/// Namespace holding ArgoCD cluster secrets
pub const DEFAULT_CLUSTER_REGISTRY_NAMESPACE: &str = "argocd";

/// Root directory for git checkouts
pub const DEFAULT_CHECKOUT_CACHE_DIR: &str = "/tmp/application-template-controller/checkouts";

/// Root directory for rendered manifests
pub const DEFAULT_RENDER_OUTPUT_DIR: &str = "/tmp/application-template-controller/rendered";

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "application-template-controller";

/// Annotation used by `atctl reconcile` to force a pass
pub const RECONCILE_ANNOTATION: &str = "templates.gitops.dev/reconcile";

/// Label selecting ArgoCD cluster secrets
pub const ARGOCD_CLUSTER_SECRET_SELECTOR: &str = "argocd.argoproj.io/secret-type=cluster";

/// Prefix of labels ArgoCD manages on its own secrets
pub const ARGOCD_LABEL_PREFIX: &str = "argocd.argoproj.io/";
