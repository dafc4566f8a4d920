//! # Status Phase Updates
//!
//! Projects the condition set onto a phase and writes status to the API server.

use super::conditions::{CONDITION_DEGRADED, CONDITION_READY};
use crate::constants::FIELD_MANAGER;
use crate::crd::{ApplicationTemplate, ApplicationTemplateStatus, Condition, ConditionStatus, Phase};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tracing::debug;

/// Where a pass currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStage {
    Idle,
    Matching,
    Rendering,
}

/// Phase for a stage and condition set
///
/// While a pass is in flight the stage wins. Once idle, `Ready=True` means
/// `Ready`, `Ready=False` means `Failed`, and no verdict yet means `Pending`.
pub fn project_phase(stage: PassStage, conditions: &[Condition]) -> Phase {
    match stage {
        PassStage::Matching => return Phase::Matching,
        PassStage::Rendering => return Phase::Rendering,
        PassStage::Idle => {}
    }

    let status_of = |condition_type: &str| {
        conditions
            .iter()
            .find(|c| c.r#type == condition_type)
            .map(|c| c.status)
    };

    match (status_of(CONDITION_READY), status_of(CONDITION_DEGRADED)) {
        (Some(ConditionStatus::True), _) => Phase::Ready,
        (Some(ConditionStatus::False), _) | (_, Some(ConditionStatus::True)) => Phase::Failed,
        _ => Phase::Pending,
    }
}

/// Patch only `status.phase`
///
/// `None` clears the phase, which is how a pass that never got past matching
/// restores a template that had no phase yet.
pub async fn update_status_phase(
    client: &Client,
    template: &ApplicationTemplate,
    phase: Option<Phase>,
) -> Result<(), kube::Error> {
    let namespace = template.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<ApplicationTemplate> = Api::namespaced(client.clone(), &namespace);
    let patch = serde_json::json!({ "status": { "phase": phase } });
    api.patch_status(
        &template.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(patch),
    )
    .await?;
    debug!(phase = ?phase, "Updated status phase");
    Ok(())
}

/// Write the whole status in one merge patch
pub async fn update_status(
    client: &Client,
    template: &ApplicationTemplate,
    status: &ApplicationTemplateStatus,
) -> Result<(), kube::Error> {
    let namespace = template.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<ApplicationTemplate> = Api::namespaced(client.clone(), &namespace);
    let patch = serde_json::json!({ "status": status });
    api.patch_status(
        &template.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(patch),
    )
    .await?;
    Ok(())
}
