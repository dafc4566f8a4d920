//! # Kustomize Renderer
//!
//! Renders an overlay directory with `kustomize build`.

use super::command::run_command;
use super::RenderError;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// File names kustomize accepts as an overlay root
const KUSTOMIZATION_FILES: [&str; 3] = ["kustomization.yaml", "kustomization.yml", "Kustomization"];

#[async_trait]
pub trait KustomizeRenderer: Send + Sync {
    async fn render(&self, overlay_dir: &Path) -> Result<Vec<u8>, RenderError>;
}

/// `kustomize build` via the Kustomize CLI
#[derive(Debug, Clone)]
pub struct CliKustomizeRenderer {
    binary: String,
    timeout: Duration,
}

impl CliKustomizeRenderer {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

#[async_trait]
impl KustomizeRenderer for CliKustomizeRenderer {
    async fn render(&self, overlay_dir: &Path) -> Result<Vec<u8>, RenderError> {
        if !has_kustomization(overlay_dir) {
            return Err(RenderError::terminal(format!(
                "no kustomization file found in {}",
                overlay_dir.display()
            )));
        }

        debug!(path = %overlay_dir.display(), "Running kustomize build");
        let mut command = Command::new(&self.binary);
        command.arg("build").arg(overlay_dir);
        run_command(command, self.timeout, "kustomize build").await
    }
}

pub(crate) fn has_kustomization(dir: &Path) -> bool {
    KUSTOMIZATION_FILES
        .iter()
        .any(|name| dir.join(name).is_file())
}
