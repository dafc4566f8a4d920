//! # Render Configuration
//!
//! Helm and Kustomize render targets.

use serde::{Deserialize, Serialize};

/// Helm chart rendering
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HelmConfig {
    /// Chart name in `repository`, or a chart path inside the git repository
    pub chart: String,
    pub version: String,
    /// Chart repository URL; when unset the chart is resolved from the checkout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Values file layered under every target's values file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_values_path: Option<String>,
    #[serde(default)]
    pub render_targets: Vec<HelmRenderTarget>,
}

/// One values file rendered for every cluster its selector matches
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HelmRenderTarget {
    pub values_path: String,
    pub destination_cluster: crate::crd::ClusterSelector,
}

/// Kustomize overlay rendering
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KustomizeConfig {
    #[serde(default)]
    pub render_targets: Vec<KustomizeRenderTarget>,
}

/// One overlay directory rendered for every cluster its selector matches
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KustomizeRenderTarget {
    /// Overlay directory relative to the repository root
    pub path: String,
    pub destination_cluster: crate::crd::ClusterSelector,
}
