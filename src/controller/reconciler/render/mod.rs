//! # Rendering
//!
//! Runs render jobs against the external collaborators:
//!
//! - `checkout` - per-pass checkout cache over a [`SourceFetcher`] (git)
//! - `helm` / `kustomize` - renderer capabilities and their CLI implementations
//! - `store` - where rendered manifests are written
//! - `executor` - bounded worker pool with retries, deadline and cancellation

mod checkout;
mod command;
mod executor;
mod helm;
mod kustomize;
mod store;

pub use checkout::{Checkout, CheckoutCache, GitSourceFetcher, SourceFetcher};
pub use command::classify_failure;
pub use executor::{Cancelled, ExecutorSettings, PassContext, RenderExecutor};
pub use helm::{helm_template_args, CliHelmRenderer, HelmRenderer, HelmRequest};
pub use kustomize::{CliKustomizeRenderer, KustomizeRenderer};
pub use store::{
    kind_file_path, manifest_digest, LocalManifestStore, ManifestStore, OwnedManifest, TemplateScope,
};

use super::planning::JobKey;
use chrono::{DateTime, Utc};

/// A render job failure
///
/// Transient failures are retried within the pass; terminal ones are reported
/// immediately.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    Terminal(String),
}

impl RenderError {
    pub fn transient(message: impl Into<String>) -> Self {
        RenderError::Transient(message.into())
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        RenderError::Terminal(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RenderError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            RenderError::Transient(message) | RenderError::Terminal(message) => message,
        }
    }

    #[must_use]
    pub fn after_attempts(self, attempts: u32) -> Self {
        match self {
            RenderError::Transient(message) => {
                RenderError::Transient(format!("{message} (gave up after {attempts} attempts)"))
            }
            terminal @ RenderError::Terminal(_) => terminal,
        }
    }
}

/// A manifest written to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedManifest {
    /// Hex sha256 of the manifest bytes
    pub digest: String,
    /// Non-empty YAML documents in the manifest
    pub documents: usize,
}

/// Result of one render job in one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutcome {
    pub key: JobKey,
    pub output_path: String,
    pub result: Result<RenderedManifest, RenderError>,
    pub attempts: u32,
    pub finished_at: DateTime<Utc>,
}

impl RenderOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&RenderError> {
        self.result.as_ref().err()
    }
}
