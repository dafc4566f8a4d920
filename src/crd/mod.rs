//! # Custom Resource Definitions
//!
//! CRD types for the ApplicationTemplate controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - Main CRD specification and default values
//! - `render.rs` - Helm and Kustomize render configuration
//! - `selector.rs` - Destination cluster selectors
//! - `status.rs` - Status types for tracking reconciliation state

mod render;
mod selector;
mod spec;
mod status;

pub use render::{HelmConfig, HelmRenderTarget, KustomizeConfig, KustomizeRenderTarget};
pub use selector::ClusterSelector;
pub use spec::{default_target_revision, ApplicationTemplate, ApplicationTemplateSpec};
pub use status::{
    ApplicationTemplateStatus, Condition, ConditionStatus, MatchedBy, MatchedCluster, Phase,
    RenderType, RenderedFile,
};
