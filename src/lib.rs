//! ApplicationTemplate Controller Library
//!
//! Matches ApplicationTemplates against the ArgoCD cluster registry and renders
//! their Helm and Kustomize targets per cluster.
//!
//! ## Quick Start
//!
//! ```rust
//! use application_template_controller::prelude::*;
//! ```

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
