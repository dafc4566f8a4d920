//! # ApplicationTemplate Spec
//!
//! Main CRD specification types and default values.

use serde::{Deserialize, Serialize};

/// ApplicationTemplate Custom Resource Definition
///
/// Describes a workload whose manifests are rendered with Helm and/or Kustomize
/// from a git repository, once per destination cluster.
///
/// # Example
///
/// ```yaml
/// apiVersion: templates.gitops.dev/v1alpha1
/// kind: ApplicationTemplate
/// metadata:
///   name: payments
///   namespace: platform
/// spec:
///   name: payments
///   repoURL: https://github.com/example/payments-deploy.git
///   targetRevision: main
///   helm:
///     chart: charts/payments
///     version: 1.4.2
///     defaultValuesPath: values.yaml
///     renderTargets:
///       - valuesPath: envs/prod/values.yaml
///         destinationCluster:
///           matchLabels:
///             env: prod
///   kustomize:
///     renderTargets:
///       - path: envs/staging
///         destinationCluster:
///           name: staging-eu-1
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ApplicationTemplate",
    group = "templates.gitops.dev",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::ApplicationTemplateStatus",
    shortname = "apptemp",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Repo", "type":"string", "jsonPath":".spec.repoURL"}, {"name":"Revision", "type":"string", "jsonPath":".spec.targetRevision"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationTemplateSpec {
    /// Application name, used as the Helm release name
    pub name: String,
    /// Git repository holding the chart, values files and overlays
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    /// Branch, tag or commit to render from
    #[serde(default = "default_target_revision")]
    pub target_revision: String,
    /// Helm rendering, optional
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm: Option<crate::crd::HelmConfig>,
    /// Kustomize rendering, optional
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kustomize: Option<crate::crd::KustomizeConfig>,
}

/// Default revision when `targetRevision` is omitted
pub fn default_target_revision() -> String {
    "main".to_string()
}

impl ApplicationTemplateSpec {
    /// True when neither Helm nor Kustomize is configured
    pub fn has_no_render_config(&self) -> bool {
        self.helm.is_none() && self.kustomize.is_none()
    }
}
