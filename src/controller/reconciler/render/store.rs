//! # Manifest Store
//!
//! Rendered manifests are written under
//! `{root}/{namespace}/{template}/{output path}`. A Helm and a Kustomize job
//! may share one output path, so each kind gets its own file next to it:
//! `prod/manifest.yaml` is stored as `prod/manifest.helm.yaml` and
//! `prod/manifest.kustomize.yaml`. Pruning works on (output path, kind)
//! pairs, so dropping one kind of a shared path removes only its file.

use super::RenderError;
use crate::controller::reconciler::planning::RenderKind;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// The template a manifest belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateScope {
    pub namespace: String,
    pub name: String,
}

impl std::fmt::Display for TemplateScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Persist a rendered manifest
    async fn store(
        &self,
        scope: &TemplateScope,
        path: &str,
        kind: RenderKind,
        manifest: &[u8],
    ) -> Result<(), RenderError>;

    /// Delete every manifest of `scope` whose (output path, kind) is not in `keep`.
    /// Returns how many files were removed.
    async fn retain(&self, scope: &TemplateScope, keep: &BTreeSet<OwnedManifest>) -> Result<usize, RenderError>;
}

/// A stored manifest: output path and the kind that rendered it
pub type OwnedManifest = (String, RenderKind);

/// Hex sha256 of a manifest
pub fn manifest_digest(manifest: &[u8]) -> String {
    format!("{:x}", Sha256::digest(manifest))
}

/// Per-kind file name for an output path: `a/manifest.yaml` → `a/manifest.helm.yaml`
pub fn kind_file_path(path: &str, kind: RenderKind) -> String {
    match path.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => {
            format!("{stem}.{}.{ext}", kind.as_str())
        }
        _ => format!("{path}.{}", kind.as_str()),
    }
}

/// Output path and kind of a per-kind file, inverse of [`kind_file_path`]
fn output_path_of(file: &str) -> Option<OwnedManifest> {
    [RenderKind::Helm, RenderKind::Kustomize]
        .into_iter()
        .find_map(|kind| {
            let marker = format!(".{}", kind.as_str());
            let (stem, ext) = file.rsplit_once('.')?;
            let stem = stem.strip_suffix(&marker)?;
            Some((format!("{stem}.{ext}"), kind))
        })
}

/// Filesystem manifest store
#[derive(Debug, Clone)]
pub struct LocalManifestStore {
    root: PathBuf,
}

impl LocalManifestStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn scope_dir(&self, scope: &TemplateScope) -> PathBuf {
        self.root.join(&scope.namespace).join(&scope.name)
    }
}

#[async_trait]
impl ManifestStore for LocalManifestStore {
    async fn store(
        &self,
        scope: &TemplateScope,
        path: &str,
        kind: RenderKind,
        manifest: &[u8],
    ) -> Result<(), RenderError> {
        let target = self.scope_dir(scope).join(kind_file_path(path, kind));
        let manifest = manifest.to_vec();
        tokio::task::spawn_blocking(move || write_if_changed(&target, &manifest))
            .await
            .map_err(|e| RenderError::terminal(format!("manifest write task failed: {e}")))?
    }

    async fn retain(&self, scope: &TemplateScope, keep: &BTreeSet<OwnedManifest>) -> Result<usize, RenderError> {
        let scope_dir = self.scope_dir(scope);
        let keep = keep.clone();
        let removed = tokio::task::spawn_blocking(move || remove_unlisted(&scope_dir, &keep))
            .await
            .map_err(|e| RenderError::terminal(format!("manifest prune task failed: {e}")))??;
        if removed > 0 {
            info!(template = %scope, removed, "Pruned manifests of removed render targets");
        }
        Ok(removed)
    }
}

fn write_if_changed(target: &Path, manifest: &[u8]) -> Result<(), RenderError> {
    if let Ok(existing) = std::fs::read(target) {
        if manifest_digest(&existing) == manifest_digest(manifest) {
            debug!(path = %target.display(), "Manifest unchanged, skipping write");
            return Ok(());
        }
    }

    let parent = target
        .parent()
        .ok_or_else(|| RenderError::terminal(format!("invalid manifest path {}", target.display())))?;
    std::fs::create_dir_all(parent)
        .map_err(|e| RenderError::terminal(format!("failed to create {}: {e}", parent.display())))?;

    let mut file = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| RenderError::terminal(format!("failed to create temp file in {}: {e}", parent.display())))?;
    file.write_all(manifest)
        .map_err(|e| RenderError::terminal(format!("failed to write manifest: {e}")))?;
    file.persist(target)
        .map_err(|e| RenderError::terminal(format!("failed to persist {}: {}", target.display(), e.error)))?;
    Ok(())
}

fn remove_unlisted(scope_dir: &Path, keep: &BTreeSet<OwnedManifest>) -> Result<usize, RenderError> {
    if !scope_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in WalkDir::new(scope_dir).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(scope_dir) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let Some(owned) = output_path_of(&relative) else {
            continue;
        };
        if !keep.contains(&owned) {
            std::fs::remove_file(entry.path()).map_err(|e| {
                RenderError::terminal(format!("failed to remove {}: {e}", entry.path().display()))
            })?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> TemplateScope {
        TemplateScope {
            namespace: "platform".to_string(),
            name: "payments".to_string(),
        }
    }

    #[test]
    fn test_kind_file_path_round_trips() {
        assert_eq!(
            kind_file_path("cluster-a/prod/manifest.yaml", RenderKind::Helm),
            "cluster-a/prod/manifest.helm.yaml"
        );
        assert_eq!(
            output_path_of("cluster-a/prod/manifest.kustomize.yaml"),
            Some(("cluster-a/prod/manifest.yaml".to_string(), RenderKind::Kustomize))
        );
        assert_eq!(output_path_of("cluster-a/notes.txt"), None);
    }

    #[tokio::test]
    async fn test_store_writes_and_skips_unchanged() {
        let dir = tempfile::tempdir().expect("tempdir should be created in test");
        let store = LocalManifestStore::new(dir.path());
        let path = "cluster-a/prod/manifest.yaml";

        store
            .store(&scope(), path, RenderKind::Helm, b"kind: ConfigMap\n")
            .await
            .expect("store should succeed in test");
        let file = store.scope_dir(&scope()).join("cluster-a/prod/manifest.helm.yaml");
        let first_modified = std::fs::metadata(&file)
            .and_then(|m| m.modified())
            .expect("metadata should be readable in test");

        store
            .store(&scope(), path, RenderKind::Helm, b"kind: ConfigMap\n")
            .await
            .expect("store should succeed in test");
        let second_modified = std::fs::metadata(&file)
            .and_then(|m| m.modified())
            .expect("metadata should be readable in test");
        assert_eq!(first_modified, second_modified);

        store
            .store(&scope(), path, RenderKind::Helm, b"kind: Secret\n")
            .await
            .expect("store should succeed in test");
        assert_eq!(
            std::fs::read(&file).expect("manifest should be readable in test"),
            b"kind: Secret\n"
        );
    }

    #[tokio::test]
    async fn test_retain_removes_unlisted_outputs() {
        let dir = tempfile::tempdir().expect("tempdir should be created in test");
        let store = LocalManifestStore::new(dir.path());
        for (path, kind) in [
            ("cluster-a/prod/manifest.yaml", RenderKind::Helm),
            ("cluster-a/prod/manifest.yaml", RenderKind::Kustomize),
            ("cluster-b/manifest.yaml", RenderKind::Kustomize),
        ] {
            store
                .store(&scope(), path, kind, b"---\n")
                .await
                .expect("store should succeed in test");
        }

        let keep = BTreeSet::from([
            ("cluster-a/prod/manifest.yaml".to_string(), RenderKind::Helm),
            ("cluster-a/prod/manifest.yaml".to_string(), RenderKind::Kustomize),
        ]);
        let removed = store
            .retain(&scope(), &keep)
            .await
            .expect("retain should succeed in test");

        assert_eq!(removed, 1);
        let scope_dir = store.scope_dir(&scope());
        assert!(scope_dir.join("cluster-a/prod/manifest.helm.yaml").exists());
        assert!(scope_dir.join("cluster-a/prod/manifest.kustomize.yaml").exists());
        assert!(!scope_dir.join("cluster-b/manifest.kustomize.yaml").exists());
    }

    #[tokio::test]
    async fn test_retain_removes_dropped_kind_of_shared_path() {
        let dir = tempfile::tempdir().expect("tempdir should be created in test");
        let store = LocalManifestStore::new(dir.path());
        let path = "cluster-a/app/manifest.yaml";
        for kind in [RenderKind::Helm, RenderKind::Kustomize] {
            store
                .store(&scope(), path, kind, b"---\n")
                .await
                .expect("store should succeed in test");
        }

        let keep = BTreeSet::from([(path.to_string(), RenderKind::Helm)]);
        let removed = store
            .retain(&scope(), &keep)
            .await
            .expect("retain should succeed in test");

        assert_eq!(removed, 1);
        let scope_dir = store.scope_dir(&scope());
        assert!(scope_dir.join("cluster-a/app/manifest.helm.yaml").exists());
        assert!(!scope_dir.join("cluster-a/app/manifest.kustomize.yaml").exists());
    }

    #[tokio::test]
    async fn test_retain_on_missing_scope_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir should be created in test");
        let store = LocalManifestStore::new(dir.path());
        let removed = store
            .retain(&scope(), &BTreeSet::new())
            .await
            .expect("retain should succeed in test");
        assert_eq!(removed, 0);
    }
}
