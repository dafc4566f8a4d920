//! # Render Executor
//!
//! Runs the jobs of one pass on a bounded worker pool. Each job is isolated:
//! its failure is recorded in its outcome and never aborts siblings. Transient
//! failures are retried with [`RetryBackoff`]; the retry sleep is the only
//! place a job waits besides I/O.
//!
//! The pass as a whole is bounded by a deadline. Jobs still running when it
//! expires are aborted and reported as failed for this pass. Cancelling the
//! token aborts every job and returns [`Cancelled`] without outcomes.

use super::checkout::{CheckoutCache, SourceFetcher};
use super::helm::{HelmRenderer, HelmRequest};
use super::kustomize::KustomizeRenderer;
use super::store::{manifest_digest, ManifestStore, TemplateScope};
use super::{RenderError, RenderOutcome, RenderedManifest};
use crate::config::ControllerConfig;
use crate::controller::backoff::RetryBackoff;
use crate::controller::reconciler::planning::{JobKey, JobSource, RenderJob};
use crate::observability::metrics;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

/// The pass was cancelled; nothing may be written for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("render pass cancelled")]
pub struct Cancelled;

/// Limits applied to one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub workers: usize,
    pub retry: RetryBackoff,
    pub pass_timeout: Duration,
}

impl ExecutorSettings {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            workers: config.render_workers.max(1),
            retry: RetryBackoff::new(
                Duration::from_millis(config.render_retry_initial_ms),
                Duration::from_millis(config.render_retry_max_ms),
                config.render_max_attempts,
            ),
            pass_timeout: config.render_pass_timeout(),
        }
    }
}

/// What every job of a pass renders from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassContext {
    pub scope: TemplateScope,
    pub repo_url: String,
    pub revision: String,
    /// Helm release name
    pub release: String,
}

/// Drives the renderer collaborators for the jobs of a pass
#[derive(Clone)]
pub struct RenderExecutor {
    fetcher: Arc<dyn SourceFetcher>,
    helm: Arc<dyn HelmRenderer>,
    kustomize: Arc<dyn KustomizeRenderer>,
    store: Arc<dyn ManifestStore>,
}

impl std::fmt::Debug for RenderExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderExecutor").finish_non_exhaustive()
    }
}

impl RenderExecutor {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        helm: Arc<dyn HelmRenderer>,
        kustomize: Arc<dyn KustomizeRenderer>,
        store: Arc<dyn ManifestStore>,
    ) -> Self {
        Self {
            fetcher,
            helm,
            kustomize,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ManifestStore> {
        &self.store
    }

    /// Run every job of a pass and return one outcome per job, ordered by job key
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] when `cancel` fires before all jobs finish.
    pub async fn execute_all(
        &self,
        context: &PassContext,
        jobs: Vec<RenderJob>,
        settings: ExecutorSettings,
        cancel: &CancellationToken,
    ) -> Result<Vec<RenderOutcome>, Cancelled> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let context = Arc::new(context.clone());
        let cache = Arc::new(CheckoutCache::new(Arc::clone(&self.fetcher)));
        let semaphore = Arc::new(Semaphore::new(settings.workers.max(1)));
        let deadline = tokio::time::Instant::now() + settings.pass_timeout;

        let mut tasks = JoinSet::new();
        let mut pending: HashMap<tokio::task::Id, (JobKey, String)> = HashMap::new();

        for job in jobs {
            let executor = self.clone();
            let context = Arc::clone(&context);
            let cache = Arc::clone(&cache);
            let semaphore = Arc::clone(&semaphore);
            let span = tracing::debug_span!(
                "render_job",
                cluster = %job.key.cluster,
                kind = %job.key.kind,
                path = %job.key.path
            );
            let identity = (job.key.clone(), job.output_path.clone());

            let handle = tasks.spawn(
                async move {
                    // The semaphore is never closed
                    let _permit = semaphore.acquire_owned().await.ok();
                    executor.run_job(&context, &cache, &job, settings.retry).await
                }
                .instrument(span),
            );
            pending.insert(handle.id(), identity);
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        let mut timed_out = false;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tasks.abort_all();
                    debug!(aborted = pending.len(), "Render pass cancelled");
                    return Err(Cancelled);
                }
                () = tokio::time::sleep_until(deadline) => {
                    tasks.abort_all();
                    timed_out = true;
                    break;
                }
                joined = tasks.join_next_with_id() => match joined {
                    None => break,
                    Some(Ok((id, outcome))) => {
                        pending.remove(&id);
                        outcomes.push(outcome);
                    }
                    Some(Err(join_error)) => {
                        if let Some((key, output_path)) = pending.remove(&join_error.id()) {
                            warn!(job = %key, error = %join_error, "Render task did not complete");
                            outcomes.push(failed_outcome(
                                key,
                                output_path,
                                RenderError::terminal(format!("render task failed: {join_error}")),
                            ));
                        }
                    }
                },
            }
        }

        if timed_out {
            warn!(
                unfinished = pending.len(),
                timeout_secs = settings.pass_timeout.as_secs(),
                "Render pass deadline exceeded"
            );
            for (key, output_path) in pending.into_values() {
                outcomes.push(failed_outcome(
                    key,
                    output_path,
                    RenderError::transient(format!(
                        "render pass deadline of {}s exceeded before the job finished",
                        settings.pass_timeout.as_secs()
                    )),
                ));
            }
        }

        outcomes.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(outcomes)
    }

    async fn run_job(
        &self,
        context: &PassContext,
        cache: &CheckoutCache,
        job: &RenderJob,
        retry: RetryBackoff,
    ) -> RenderOutcome {
        let started = Instant::now();
        let kind = job.key.kind.as_str();
        let mut attempts = 0;

        let result = loop {
            attempts += 1;
            match self.render_once(context, cache, job).await {
                Ok(manifest) => break Ok(manifest),
                Err(error) if error.is_transient() => match retry.delay_for(attempts) {
                    Some(delay) => {
                        warn!(
                            attempt = attempts,
                            retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %error,
                            "Transient render failure, retrying"
                        );
                        metrics::increment_render_retries(kind);
                        tokio::time::sleep(delay).await;
                    }
                    None => break Err(error.after_attempts(attempts)),
                },
                Err(error) => break Err(error),
            }
        };

        metrics::record_render_job(kind, result.is_ok(), started.elapsed().as_secs_f64());
        match &result {
            Ok(manifest) => debug!(
                documents = manifest.documents,
                digest = %manifest.digest,
                "Rendered manifest"
            ),
            Err(error) => warn!(error = %error, "Render job failed"),
        }

        RenderOutcome {
            key: job.key.clone(),
            output_path: job.output_path.clone(),
            result,
            attempts,
            finished_at: Utc::now(),
        }
    }

    async fn render_once(
        &self,
        context: &PassContext,
        cache: &CheckoutCache,
        job: &RenderJob,
    ) -> Result<RenderedManifest, RenderError> {
        let checkout = cache.checkout(&context.repo_url, &context.revision).await?;
        let checkout = checkout.path();

        let manifest = match &job.source {
            JobSource::Helm(chart) => {
                let values_files =
                    helm_values_files(checkout, chart.default_values_path.as_deref(), &job.key.path)?;
                self.helm
                    .render(&HelmRequest {
                        workdir: checkout,
                        release: &context.release,
                        chart: &chart.chart,
                        version: &chart.version,
                        repository: chart.repository.as_deref(),
                        values_files: &values_files,
                    })
                    .await?
            }
            JobSource::Kustomize => {
                let overlay_dir = resolve_in_checkout(checkout, &job.key.path);
                if !overlay_dir.is_dir() {
                    return Err(RenderError::terminal(format!(
                        "overlay directory '{}' not found in repository",
                        job.key.path
                    )));
                }
                self.kustomize.render(&overlay_dir).await?
            }
        };

        let documents = count_documents(&manifest)?;
        let digest = manifest_digest(&manifest);
        self.store
            .store(&context.scope, &job.output_path, job.key.kind, &manifest)
            .await?;

        Ok(RenderedManifest { digest, documents })
    }
}

fn failed_outcome(key: JobKey, output_path: String, error: RenderError) -> RenderOutcome {
    RenderOutcome {
        key,
        output_path,
        result: Err(error),
        attempts: 0,
        finished_at: Utc::now(),
    }
}

fn resolve_in_checkout(checkout: &Path, relative: &str) -> PathBuf {
    if relative.is_empty() {
        checkout.to_path_buf()
    } else {
        checkout.join(relative)
    }
}

/// Values files for a Helm job, lowest precedence first
///
/// # Errors
///
/// Terminal error when a listed file does not exist in the checkout.
pub(crate) fn helm_values_files(
    checkout: &Path,
    default_values_path: Option<&str>,
    values_path: &str,
) -> Result<Vec<PathBuf>, RenderError> {
    default_values_path
        .into_iter()
        .chain(std::iter::once(values_path))
        .map(|relative| {
            let path = resolve_in_checkout(checkout, relative);
            if path.is_file() {
                Ok(path)
            } else {
                Err(RenderError::terminal(format!(
                    "values file '{relative}' not found in repository"
                )))
            }
        })
        .collect()
}

/// Count non-empty YAML documents, rejecting output that is not YAML
pub(crate) fn count_documents(manifest: &[u8]) -> Result<usize, RenderError> {
    let mut documents = 0;
    for document in serde_yaml::Deserializer::from_slice(manifest) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| {
            RenderError::terminal(format!("renderer produced invalid YAML: {e}"))
        })?;
        if !value.is_null() {
            documents += 1;
        }
    }
    Ok(documents)
}
