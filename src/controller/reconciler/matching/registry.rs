//! # Cluster Registry
//!
//! The fleet inventory is read from ArgoCD cluster secrets: every Secret labelled
//! `argocd.argoproj.io/secret-type=cluster` describes one destination cluster.
//! The cluster name comes from the secret's `name` data key and the selector
//! labels are the secret's own labels, minus the ones ArgoCD manages.

use super::ClusterRef;
use crate::constants::{ARGOCD_CLUSTER_SECRET_SELECTOR, ARGOCD_LABEL_PREFIX};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::ListParams;
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::debug;

/// The registry could not be listed; the pass is aborted and retried later
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("cluster registry unavailable: {0}")]
    Kube(#[from] kube::Error),
    #[error("cluster registry unavailable: {0}")]
    Unavailable(String),
}

/// Source of the cluster inventory, read once per pass
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    async fn list_clusters(&self) -> Result<Vec<ClusterRef>, RegistryError>;
}

/// Cluster registry backed by ArgoCD cluster secrets
#[derive(Clone)]
pub struct ArgoCdClusterRegistry {
    secrets: Api<Secret>,
    namespace: String,
}

impl std::fmt::Debug for ArgoCdClusterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgoCdClusterRegistry")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl ArgoCdClusterRegistry {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            secrets: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl ClusterRegistry for ArgoCdClusterRegistry {
    async fn list_clusters(&self) -> Result<Vec<ClusterRef>, RegistryError> {
        let params = ListParams::default().labels(ARGOCD_CLUSTER_SECRET_SELECTOR);
        let secrets = self.secrets.list(&params).await?;
        let clusters: Vec<ClusterRef> = secrets.items.iter().filter_map(cluster_from_secret).collect();
        debug!(
            namespace = %self.namespace,
            clusters = clusters.len(),
            "Listed ArgoCD cluster secrets"
        );
        Ok(clusters)
    }
}

/// Convert an ArgoCD cluster secret into a registry entry
pub fn cluster_from_secret(secret: &Secret) -> Option<ClusterRef> {
    let data_name = secret
        .data
        .as_ref()
        .and_then(|data| data.get("name"))
        .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get("name").cloned())
        });

    let name = data_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| secret.metadata.name.clone())?;

    let labels: BTreeMap<String, String> = secret
        .metadata
        .labels
        .iter()
        .flatten()
        .filter(|(key, _)| !key.starts_with(ARGOCD_LABEL_PREFIX))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Some(ClusterRef { name, labels })
}
