//! # Helm Renderer
//!
//! Renders a chart with `helm template`. Values files are passed in precedence
//! order, lowest first, so Helm layers them the same way on every run.

use super::command::run_command;
use super::RenderError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Inputs of one Helm render
#[derive(Debug, Clone, Copy)]
pub struct HelmRequest<'a> {
    /// Repository checkout; local chart paths resolve against it
    pub workdir: &'a Path,
    pub release: &'a str,
    pub chart: &'a str,
    pub version: &'a str,
    pub repository: Option<&'a str>,
    /// Values files, lowest precedence first
    pub values_files: &'a [PathBuf],
}

#[async_trait]
pub trait HelmRenderer: Send + Sync {
    async fn render(&self, request: &HelmRequest<'_>) -> Result<Vec<u8>, RenderError>;
}

/// `helm template` via the Helm CLI
#[derive(Debug, Clone)]
pub struct CliHelmRenderer {
    binary: String,
    timeout: Duration,
}

impl CliHelmRenderer {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

#[async_trait]
impl HelmRenderer for CliHelmRenderer {
    async fn render(&self, request: &HelmRequest<'_>) -> Result<Vec<u8>, RenderError> {
        debug!(
            chart = %request.chart,
            version = %request.version,
            values_files = request.values_files.len(),
            "Running helm template"
        );
        let mut command = Command::new(&self.binary);
        command
            .args(helm_template_args(request))
            .current_dir(request.workdir);
        run_command(command, self.timeout, "helm template").await
    }
}

/// Arguments for `helm template`
pub fn helm_template_args(request: &HelmRequest<'_>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "template".into(),
        request.release.into(),
        request.chart.into(),
        "--version".into(),
        request.version.into(),
    ];
    if let Some(repository) = request.repository {
        args.push("--repo".into());
        args.push(repository.into());
    }
    for values_file in request.values_files {
        args.push("--values".into());
        args.push(values_file.clone().into_os_string());
    }
    args
}
