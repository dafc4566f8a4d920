//! # Render Pipeline
//!
//! One reconcile pass without the Kubernetes plumbing: snapshot the registry,
//! plan, render, aggregate. Writing status and pruning the store are separate
//! steps so the caller can skip both when a pass is cancelled.

use super::matching::{ClusterRegistry, RegistryError, RegistrySnapshot};
use super::planning::{plan, RenderPlan};
use super::render::{
    Cancelled, ExecutorSettings, OwnedManifest, PassContext, RenderError, RenderExecutor,
    RenderOutcome, TemplateScope,
};
use super::status::{aggregate, Aggregation, PassStage};
use crate::crd::{ApplicationTemplateSpec, ApplicationTemplateStatus};
use crate::observability::metrics;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives stage changes while a pass runs
#[async_trait::async_trait]
pub trait StageObserver: Send + Sync {
    async fn stage(&self, stage: PassStage);
}

/// Observer that ignores stage changes
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreStages;

#[async_trait::async_trait]
impl StageObserver for IgnoreStages {
    async fn stage(&self, _stage: PassStage) {}
}

#[derive(Debug, thiserror::Error)]
pub enum PassError {
    #[error(transparent)]
    Match(#[from] RegistryError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Everything a completed pass produced
#[derive(Debug, Clone)]
pub struct PassOutput {
    pub plan: RenderPlan,
    pub outcomes: Vec<RenderOutcome>,
    pub aggregation: Aggregation,
}

#[derive(Clone)]
pub struct RenderPipeline {
    registry: Arc<dyn ClusterRegistry>,
    executor: RenderExecutor,
}

impl std::fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl RenderPipeline {
    pub fn new(registry: Arc<dyn ClusterRegistry>, executor: RenderExecutor) -> Self {
        Self { registry, executor }
    }

    /// Immutable view of the registry for one pass
    pub async fn snapshot(&self) -> Result<RegistrySnapshot, RegistryError> {
        match self.registry.list_clusters().await {
            Ok(clusters) => Ok(RegistrySnapshot::new(clusters)),
            Err(e) => {
                metrics::increment_registry_errors();
                Err(e)
            }
        }
    }

    /// Run matching, planning, rendering and aggregation
    ///
    /// # Errors
    ///
    /// [`PassError::Match`] when the registry cannot be listed and
    /// [`PassError::Cancelled`] when `cancel` fires mid-render. Neither leaves
    /// anything to write.
    pub async fn run_pass(
        &self,
        spec: &ApplicationTemplateSpec,
        context: &PassContext,
        previous: Option<&ApplicationTemplateStatus>,
        settings: ExecutorSettings,
        cancel: &CancellationToken,
        observer: &dyn StageObserver,
    ) -> Result<PassOutput, PassError> {
        observer.stage(PassStage::Matching).await;
        let snapshot = self.snapshot().await?;
        debug!(clusters = snapshot.len(), "Took cluster registry snapshot");

        let plan = plan(spec, &snapshot);
        for warning in &plan.warnings {
            warn!(reason = warning.reason(), "{}", warning);
        }
        info!(
            jobs = plan.jobs.len(),
            clusters = plan.clusters().len(),
            "Planned render jobs"
        );

        if cancel.is_cancelled() {
            return Err(PassError::Cancelled(Cancelled));
        }

        let outcomes = if plan.jobs.is_empty() {
            Vec::new()
        } else {
            observer.stage(PassStage::Rendering).await;
            self.executor
                .execute_all(context, plan.jobs.clone(), settings, cancel)
                .await?
        };

        let aggregation = aggregate(previous, &plan, &outcomes, Utc::now());
        Ok(PassOutput {
            plan,
            outcomes,
            aggregation,
        })
    }

    /// Remove stored manifests that no planned job of `plan` owns
    ///
    /// Ownership is per (output path, kind): files of failed jobs stay, since
    /// the status may still list them as stale.
    pub async fn prune(&self, scope: &TemplateScope, plan: &RenderPlan) -> Result<usize, RenderError> {
        let keep: BTreeSet<OwnedManifest> = plan
            .jobs
            .iter()
            .map(|job| (job.output_path.clone(), job.key.kind))
            .collect();
        let removed = self.executor.store().retain(scope, &keep).await?;
        if removed > 0 {
            info!(removed, "Pruned manifests no longer owned by the template");
        }
        Ok(removed)
    }
}
