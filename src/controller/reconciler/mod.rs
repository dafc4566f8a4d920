//! # Reconciler
//!
//! Cluster matching and manifest rendering for `ApplicationTemplate` resources.
//!
//! The pure core (selector evaluation, planning, aggregation) has no I/O. The
//! rendering layer drives git, Helm and Kustomize through traits so the whole
//! pass can run against in-memory fakes.
//!
//! ## Reconciliation Flow
//!
//! 1. Snapshot the cluster registry (ArgoCD cluster secrets)
//! 2. Expand render targets into (cluster, kind, path) jobs
//! 3. Render jobs on a bounded worker pool with retries
//! 4. Fold outcomes into status and prune unowned manifests

pub mod matching;
pub mod passes;
pub mod pipeline;
pub mod planning;
pub mod reconcile;
pub mod render;
pub mod status;
pub mod trigger;
pub mod types;
pub mod validation;
pub mod watch;

pub use pipeline::{IgnoreStages, PassError, PassOutput, RenderPipeline, StageObserver};
pub use reconcile::reconcile;
pub use types::{BackoffState, Reconciler, ReconcilerError, TriggerSource};
pub use watch::start_deletion_watch;
