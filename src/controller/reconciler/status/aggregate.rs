//! # Status Aggregation
//!
//! Pure reducer from (previous status, plan, outcomes, now) to the next status.
//!
//! Rendered files are keyed by (cluster, path). For every key owned by the
//! plan the entry is replaced when all of its jobs succeeded, retained as
//! stale when a job failed and an earlier render exists, and built from the
//! successful kinds when there is nothing to retain. Keys the plan no longer
//! owns are pruned.

use super::conditions::{
    upsert_condition, CONDITION_CONFIGURATION_WARNING, CONDITION_DEGRADED, CONDITION_READY,
    CONDITION_STALE,
};
use super::phase::{project_phase, PassStage};
use crate::controller::reconciler::planning::{JobKey, JobSource, RenderJob, RenderKind, RenderPlan};
use crate::controller::reconciler::render::RenderOutcome;
use crate::crd::{
    ApplicationTemplateStatus, ConditionStatus, MatchedCluster, RenderType, RenderedFile,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Next status plus the counts the caller reports as metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub status: ApplicationTemplateStatus,
    pub failed_jobs: usize,
    pub stale_files: usize,
}

type FileKey = (String, String);

/// Compute the status that follows a pass
///
/// Fields the aggregator does not own (generation and scheduling
/// bookkeeping) are carried over from `previous`.
pub fn aggregate(
    previous: Option<&ApplicationTemplateStatus>,
    plan: &RenderPlan,
    outcomes: &[RenderOutcome],
    now: DateTime<Utc>,
) -> Aggregation {
    let now_str = now.to_rfc3339();
    let outcomes = latest_outcomes(outcomes);

    let matched_clusters: Vec<MatchedCluster> = plan
        .jobs
        .iter()
        .map(|job| matched_cluster(job, outcomes.get(&job.key).is_some_and(|o| o.succeeded())))
        .collect();

    let failures: Vec<String> = plan
        .jobs
        .iter()
        .filter_map(|job| match outcomes.get(&job.key) {
            Some(outcome) => outcome.error().map(|e| format!("{}: {}", job.key, e.message())),
            None => Some(format!("{}: no render outcome recorded", job.key)),
        })
        .collect();

    let (rendered_files, stale) = merge_rendered_files(previous, plan, &outcomes, &now_str);

    let mut conditions = previous.map(|p| p.conditions.clone()).unwrap_or_default();
    let total = plan.jobs.len();
    let ready_message = if total == 0 {
        "no render jobs planned".to_string()
    } else {
        format!("{} of {} render jobs succeeded", total - failures.len(), total)
    };
    upsert_condition(
        &mut conditions,
        CONDITION_READY,
        ConditionStatus::from_bool(failures.is_empty()),
        if failures.is_empty() { "AllRendered" } else { "RenderFailed" },
        ready_message,
        &now_str,
    );
    upsert_condition(
        &mut conditions,
        CONDITION_DEGRADED,
        ConditionStatus::from_bool(!failures.is_empty()),
        if failures.is_empty() { "NoFailures" } else { "RenderJobsFailed" },
        failures.join("; "),
        &now_str,
    );
    upsert_condition(
        &mut conditions,
        CONDITION_STALE,
        ConditionStatus::from_bool(!stale.is_empty()),
        if stale.is_empty() { "UpToDate" } else { "StaleFilesRetained" },
        stale
            .iter()
            .map(|(cluster, path)| format!("{cluster}:{path}"))
            .collect::<Vec<_>>()
            .join(", "),
        &now_str,
    );
    let warning_reason = match plan.warnings.as_slice() {
        [] => "NoWarnings",
        [only] => only.reason(),
        _ => "MultipleWarnings",
    };
    upsert_condition(
        &mut conditions,
        CONDITION_CONFIGURATION_WARNING,
        ConditionStatus::from_bool(!plan.warnings.is_empty()),
        warning_reason,
        plan.warnings
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; "),
        &now_str,
    );

    let phase = project_phase(PassStage::Idle, &conditions);
    let status = ApplicationTemplateStatus {
        phase: Some(phase),
        matched_clusters,
        rendered_files,
        conditions,
        ..previous.cloned().unwrap_or_default()
    };

    Aggregation {
        status,
        failed_jobs: failures.len(),
        stale_files: stale.len(),
    }
}

/// One outcome per key; repeated outcomes resolve to the latest finish
fn latest_outcomes(outcomes: &[RenderOutcome]) -> BTreeMap<JobKey, &RenderOutcome> {
    let mut latest: BTreeMap<JobKey, &RenderOutcome> = BTreeMap::new();
    for outcome in outcomes {
        match latest.get(&outcome.key) {
            Some(current) if current.finished_at >= outcome.finished_at => {}
            _ => {
                latest.insert(outcome.key.clone(), outcome);
            }
        }
    }
    latest
}

fn matched_cluster(job: &RenderJob, rendered: bool) -> MatchedCluster {
    let (helm_values_path, kustomize_path) = match job.source {
        JobSource::Helm(_) => (Some(job.key.path.clone()), None),
        JobSource::Kustomize => (None, Some(job.key.path.clone())),
    };
    MatchedCluster {
        name: job.key.cluster.clone(),
        matched_by: job.matched_by,
        matched_labels: job.matched_labels.clone(),
        helm_values_path,
        kustomize_path,
        rendered,
    }
}

fn merge_rendered_files(
    previous: Option<&ApplicationTemplateStatus>,
    plan: &RenderPlan,
    outcomes: &BTreeMap<JobKey, &RenderOutcome>,
    now: &str,
) -> (Vec<RenderedFile>, Vec<FileKey>) {
    let retained = previous_files(previous);

    let mut owned: BTreeMap<FileKey, OwnedFile> = BTreeMap::new();
    for job in &plan.jobs {
        let entry = owned
            .entry((job.key.cluster.clone(), job.output_path.clone()))
            .or_default();
        entry.planned.insert(job.key.kind);
        if outcomes.get(&job.key).is_some_and(|o| o.succeeded()) {
            entry.succeeded.insert(job.key.kind);
        } else {
            entry.any_failed = true;
        }
    }

    let mut files = Vec::with_capacity(owned.len());
    let mut stale = Vec::new();
    for (key, owned_file) in owned {
        // A retained entry may only claim kinds that are still planned
        let narrowed = retained.get(&key).and_then(|previous| {
            let kinds: BTreeSet<RenderKind> = kinds_of(previous.render_type)
                .intersection(&owned_file.planned)
                .copied()
                .collect();
            render_type(&kinds).map(|render_type| RenderedFile {
                render_type,
                ..previous.clone()
            })
        });
        match (owned_file.any_failed, narrowed) {
            (true, Some(previous)) => {
                files.push(previous);
                stale.push(key);
            }
            _ => {
                if let Some(render_type) = render_type(&owned_file.succeeded) {
                    files.push(RenderedFile {
                        path: key.1,
                        cluster: key.0,
                        render_type,
                        timestamp: now.to_string(),
                    });
                }
            }
        }
    }
    (files, stale)
}

/// Jobs of one pass that map to a single (cluster, path)
#[derive(Debug, Default)]
struct OwnedFile {
    planned: BTreeSet<RenderKind>,
    succeeded: BTreeSet<RenderKind>,
    any_failed: bool,
}

fn kinds_of(render_type: RenderType) -> BTreeSet<RenderKind> {
    match render_type {
        RenderType::Helm => BTreeSet::from([RenderKind::Helm]),
        RenderType::Kustomize => BTreeSet::from([RenderKind::Kustomize]),
        RenderType::Both => BTreeSet::from([RenderKind::Helm, RenderKind::Kustomize]),
    }
}

fn render_type(kinds: &BTreeSet<RenderKind>) -> Option<RenderType> {
    match (kinds.contains(&RenderKind::Helm), kinds.contains(&RenderKind::Kustomize)) {
        (true, true) => Some(RenderType::Both),
        (true, false) => Some(RenderType::Helm),
        (false, true) => Some(RenderType::Kustomize),
        (false, false) => None,
    }
}

/// Previous rendered files by key, duplicates resolved to the newest render
fn previous_files(previous: Option<&ApplicationTemplateStatus>) -> BTreeMap<FileKey, RenderedFile> {
    let mut files: BTreeMap<FileKey, RenderedFile> = BTreeMap::new();
    for file in previous.map(|p| p.rendered_files.as_slice()).unwrap_or_default() {
        let key = (file.cluster.clone(), file.path.clone());
        match files.get(&key) {
            Some(existing) => {
                warn!(
                    cluster = %file.cluster,
                    path = %file.path,
                    "Duplicate rendered file entries in previous status, keeping the most recent"
                );
                if is_newer(&file.timestamp, &existing.timestamp) {
                    files.insert(key, file.clone());
                }
            }
            None => {
                files.insert(key, file.clone());
            }
        }
    }
    files
}

fn is_newer(candidate: &str, current: &str) -> bool {
    match (
        DateTime::parse_from_rfc3339(candidate),
        DateTime::parse_from_rfc3339(current),
    ) {
        (Ok(candidate), Ok(current)) => candidate > current,
        (Ok(_), Err(_)) => true,
        (Err(_), Ok(_)) => false,
        (Err(_), Err(_)) => candidate > current,
    }
}
