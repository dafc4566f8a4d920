//! # Types
//!
//! Core types for the reconciler.

use super::matching::{ClusterRegistry, RegistryError};
use super::passes::PassRegistry;
use super::pipeline::RenderPipeline;
use crate::config::SharedControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use chrono::{DateTime, Utc};
use kube::Client;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Registry could not be listed; the pass was aborted before planning
    #[error("Cluster registry unavailable: {0}")]
    Match(#[from] RegistryError),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

/// Why a reconcile pass runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// `metadata.generation` moved past `status.observedGeneration`
    SpecChange,
    /// An ArgoCD cluster secret was added, changed or removed
    RegistryChange,
    /// `status.nextReconcileTime` reached
    Periodic,
    /// Reconcile annotation set via `atctl reconcile`
    ManualCli,
    /// Backoff elapsed after a failed pass
    RetryAfterFailure,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::SpecChange => "spec-change",
            TriggerSource::RegistryChange => "registry-change",
            TriggerSource::Periodic => "periodic",
            TriggerSource::ManualCli => "manual-cli",
            TriggerSource::RetryAfterFailure => "retry-after-failure",
        }
    }
}

/// Backoff state for a specific template
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
    /// Earliest time an aborted pass may be retried
    pub retry_at: Option<DateTime<Utc>>,
}

impl BackoffState {
    pub fn new(start_minutes: u64, max_minutes: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(start_minutes, max_minutes),
            error_count: 0,
            retry_at: None,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.retry_at = None;
        self.backoff.reset();
    }
}

#[derive(Clone)]
pub struct Reconciler {
    pub client: Client,
    pub config: SharedControllerConfig,
    pub pipeline: RenderPipeline,
    // Keyed by namespace/name
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
    pub passes: PassRegistry,
    // Templates owed a pass because the cluster registry changed
    pub registry_changes: Arc<Mutex<HashSet<String>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        client: Client,
        config: SharedControllerConfig,
        registry: Arc<dyn ClusterRegistry>,
        executor: super::render::RenderExecutor,
    ) -> Self {
        Self {
            client,
            config,
            pipeline: RenderPipeline::new(registry, executor),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
            passes: PassRegistry::default(),
            registry_changes: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Mark every listed template as owed a registry-change pass
    pub fn note_registry_change<'a>(&self, keys: impl IntoIterator<Item = &'a str>) {
        let mut pending = self
            .registry_changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pending.extend(keys.into_iter().map(str::to_string));
    }

    /// Take the pending registry-change flag for a template
    pub fn take_registry_change(&self, key: &str) -> bool {
        self.registry_changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Earliest retry time recorded by the error policy
    pub fn retry_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .and_then(|state| state.retry_at)
    }

    /// Next backoff delay after a pass that completed with failed jobs
    pub fn render_failure_backoff(&self, key: &str, start_minutes: u64, max_minutes: u64) -> std::time::Duration {
        let mut states = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let state = states
            .entry(key.to_string())
            .or_insert_with(|| BackoffState::new(start_minutes, max_minutes));
        state.increment_error();
        state.retry_at = None;
        state.backoff.next_backoff()
    }

    pub fn reset_backoff(&self, key: &str) {
        if let Some(state) = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(key)
        {
            state.reset();
        }
    }

    /// Forget everything held for a deleted template
    pub fn forget(&self, key: &str) {
        self.backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        self.registry_changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
