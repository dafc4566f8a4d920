//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use application_template_controller::prelude::*;
//! ```

pub use crate::crd::*;

pub use crate::controller::reconciler::matching::{
    evaluate, ClusterRef, ClusterRegistry, RegistryError, RegistrySnapshot, SelectorMatch,
};
pub use crate::controller::reconciler::planning::{plan, JobKey, RenderJob, RenderKind, RenderPlan};
pub use crate::controller::reconciler::render::{
    ExecutorSettings, HelmRenderer, KustomizeRenderer, ManifestStore, PassContext, RenderError,
    RenderExecutor, RenderOutcome, SourceFetcher, TemplateScope,
};
pub use crate::controller::reconciler::status::aggregate;
pub use crate::controller::reconciler::{
    reconcile, BackoffState, Reconciler, ReconcilerError, RenderPipeline, TriggerSource,
};

pub use crate::config::{
    ControllerConfig, ServerConfig, SharedControllerConfig, SharedServerConfig,
};
