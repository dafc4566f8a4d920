//! # Reconciliation Logic
//!
//! Entry point the controller calls for every ApplicationTemplate event.
//!
//! 1. Decide whether a trigger applies; skip and requeue otherwise
//! 2. Mark `Matching`, snapshot the registry and plan
//! 3. Mark `Rendering` and run the render jobs
//! 4. Aggregate and write the whole status in one patch
//! 5. Prune manifests the template no longer owns and requeue
//!
//! A registry failure restores the previous phase and hands the error to the
//! error policy. A cancelled pass writes nothing.

use super::pipeline::{PassError, StageObserver};
use super::render::{ExecutorSettings, PassContext, TemplateScope};
use super::status::{project_phase, update_status, update_status_phase, PassStage};
use super::trigger::{detect_trigger, manual_trigger_value, time_until_next_pass, TriggerState};
use super::types::{Reconciler, ReconcilerError, TriggerSource};
use crate::config::ControllerConfig;
use crate::crd::{ApplicationTemplate, Phase};
use crate::observability::metrics;
use chrono::Utc;
use kube::{Client, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Main reconciliation function
pub async fn reconcile(
    template: Arc<ApplicationTemplate>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = template.name_any();
    let namespace = template.namespace().unwrap_or_else(|| "default".to_string());
    let key = format!("{namespace}/{name}");

    if template.metadata.deletion_timestamp.is_some() {
        debug!(namespace = %namespace, name = %name, "Template is being deleted, skipping");
        return Ok(Action::await_change());
    }

    let config = ctx.config.read().await.clone();
    let now = Utc::now();
    let retry_at = ctx.retry_at(&key);
    let state = TriggerState {
        registry_changed: ctx.take_registry_change(&key),
        retry_at,
    };

    let Some(trigger) = detect_trigger(&template, now, state) else {
        let wait = time_until_next_pass(&template, now, retry_at, config.resync_interval());
        debug!(
            namespace = %namespace,
            name = %name,
            requeue_secs = wait.as_secs(),
            "Skipping reconciliation - no trigger applies"
        );
        return Ok(Action::requeue(wait));
    };

    let span = tracing::info_span!(
        "reconcile",
        namespace = %namespace,
        name = %name,
        trigger = trigger.as_str()
    );

    metrics::increment_reconciliations(trigger.as_str());
    let start = Instant::now();
    let pass = ctx.passes.begin(&key);

    let result = run_pass(&template, &ctx, &config, trigger, &key, &pass.token)
        .instrument(span)
        .await;

    ctx.passes.finish(&key, &pass);
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    result
}

async fn run_pass(
    template: &ApplicationTemplate,
    ctx: &Reconciler,
    config: &ControllerConfig,
    trigger: TriggerSource,
    key: &str,
    cancel: &CancellationToken,
) -> Result<Action, ReconcilerError> {
    let scope = TemplateScope {
        namespace: template.namespace().unwrap_or_else(|| "default".to_string()),
        name: template.name_any(),
    };
    let release = if template.spec.name.is_empty() {
        scope.name.clone()
    } else {
        template.spec.name.clone()
    };
    let context = PassContext {
        scope: scope.clone(),
        repo_url: template.spec.repo_url.clone(),
        revision: template.spec.target_revision.clone(),
        release,
    };

    info!(
        repo = %context.repo_url,
        revision = %context.revision,
        "Starting reconcile pass"
    );

    let previous = template.status.as_ref();
    let previous_phase = previous.and_then(|s| s.phase);
    let phases = PhaseWriter::new(ctx.client.clone(), template, previous_phase);

    let output = match ctx
        .pipeline
        .run_pass(
            &template.spec,
            &context,
            previous,
            ExecutorSettings::from_config(config),
            cancel,
            &phases,
        )
        .await
    {
        Ok(output) => output,
        // No write after cancellation, not even a phase restore: the phase may
        // stay at Matching or Rendering until the next pass overwrites it
        Err(PassError::Cancelled(_)) => {
            info!("Pass cancelled, leaving status untouched");
            return Ok(Action::await_change());
        }
        Err(PassError::Match(e)) => {
            warn!(error = %e, "Cluster registry unavailable, aborting pass");
            phases.restore(previous_phase).await;
            return Err(ReconcilerError::Match(e));
        }
    };

    if cancel.is_cancelled() {
        info!("Pass cancelled after rendering, leaving status untouched");
        return Ok(Action::await_change());
    }

    let failed_jobs = output.aggregation.failed_jobs;
    let stale_files = output.aggregation.stale_files;
    let delay = if failed_jobs > 0 {
        ctx.render_failure_backoff(key, config.backoff_start_minutes, config.backoff_max_minutes)
    } else {
        ctx.reset_backoff(key);
        config.resync_interval()
    };

    let finished = Utc::now();
    let mut status = output.aggregation.status;
    status.observed_generation = template.metadata.generation;
    status.last_reconcile_time = Some(finished.to_rfc3339());
    status.next_reconcile_time = Some(
        (finished + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero()))
            .to_rfc3339(),
    );
    if let Some(requested) = manual_trigger_value(template) {
        status.last_handled_reconcile_at = Some(requested.to_string());
    }

    update_status(&ctx.client, template, &status).await?;

    if let Err(e) = ctx.pipeline.prune(&scope, &output.plan).await {
        warn!(error = %e, "Failed to prune manifests, will retry next pass");
    }

    metrics::set_template_gauges(
        &scope.namespace,
        &scope.name,
        status.matched_clusters.len(),
        stale_files,
    );

    let phase = status.phase.unwrap_or(Phase::Pending);
    if failed_jobs > 0 {
        warn!(
            phase = %phase,
            trigger = trigger.as_str(),
            failed_jobs,
            stale_files,
            retry_in_secs = delay.as_secs(),
            "Reconcile pass finished with failed render jobs"
        );
    } else {
        info!(
            phase = %phase,
            trigger = trigger.as_str(),
            rendered_files = status.rendered_files.len(),
            next_in_secs = delay.as_secs(),
            "Reconcile pass finished"
        );
    }

    Ok(Action::requeue(delay.max(Duration::from_secs(1))))
}

/// Writes stage changes to `status.phase`, skipping repeats
struct PhaseWriter<'a> {
    client: Client,
    template: &'a ApplicationTemplate,
    written: Mutex<Option<Phase>>,
}

impl<'a> PhaseWriter<'a> {
    fn new(client: Client, template: &'a ApplicationTemplate, current: Option<Phase>) -> Self {
        Self {
            client,
            template,
            written: Mutex::new(current),
        }
    }

    async fn write(&self, phase: Option<Phase>) {
        {
            let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
            if *written == phase {
                return;
            }
            *written = phase;
        }
        if let Err(e) = update_status_phase(&self.client, self.template, phase).await {
            warn!(error = %e, phase = ?phase, "Failed to update status phase");
        }
    }

    async fn restore(&self, phase: Option<Phase>) {
        self.write(phase).await;
    }
}

#[async_trait::async_trait]
impl StageObserver for PhaseWriter<'_> {
    async fn stage(&self, stage: PassStage) {
        self.write(Some(project_phase(stage, &[]))).await;
    }
}
