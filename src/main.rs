//! # ApplicationTemplate Controller
//!
//! Watches `ApplicationTemplate` resources in all namespaces, selects target
//! clusters from the ArgoCD cluster registry and renders each template's Helm
//! and Kustomize targets per cluster.

use anyhow::Result;
use application_template_controller::runtime::{initialization, watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialization::initialize().await?;

    watch_loop::run_watch_loop(
        init.templates,
        init.reconciler,
        init.server_state,
        init.controller_config,
    )
    .await
}
