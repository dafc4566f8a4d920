//! # ApplicationTemplate Status
//!
//! Status types describing the outcome of the last reconcile pass. These fields
//! are consumed by dashboards and delivery tooling and keep their meaning across
//! passes for unchanged input.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Status of the ApplicationTemplate resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, schemars::JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationTemplateStatus {
    /// Coarse projection of the condition set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    /// Clusters selected in the last pass, one entry per render job
    #[serde(default)]
    pub matched_clusters: Vec<MatchedCluster>,
    /// Rendered manifests keyed by (cluster, path)
    #[serde(default)]
    pub rendered_files: Vec<RenderedFile>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Generation of the spec the last completed pass rendered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Last reconciliation time (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<String>,
    /// Next scheduled reconciliation time (RFC3339)
    /// Used to persist periodic reconciliation schedule across watch restarts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_reconcile_time: Option<String>,
    /// Value of the reconcile annotation handled by the last pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_handled_reconcile_at: Option<String>,
}

impl ApplicationTemplateStatus {
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }
}

/// Reconcile phase
///
/// `Pending → Matching → Rendering → {Ready | Failed}`; any later trigger re-enters `Matching`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, schemars::JsonSchema, PartialEq, Eq, Hash)]
pub enum Phase {
    Pending,
    Matching,
    Rendering,
    Ready,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Pending => "Pending",
            Phase::Matching => "Matching",
            Phase::Rendering => "Rendering",
            Phase::Ready => "Ready",
            Phase::Failed => "Failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a cluster was selected
#[derive(
    Debug, Clone, Copy, Deserialize, Serialize, schemars::JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum MatchedBy {
    Name,
    Label,
}

/// A cluster selected by one render target
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchedCluster {
    pub name: String,
    pub matched_by: MatchedBy,
    /// Selector labels that produced the match (label matches only)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub matched_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_values_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kustomize_path: Option<String>,
    /// Whether this cluster's render succeeded in the last pass
    #[serde(default)]
    pub rendered: bool,
}

/// Which renderers produced a rendered file
#[derive(Debug, Clone, Copy, Deserialize, Serialize, schemars::JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RenderType {
    Helm,
    Kustomize,
    Both,
}

impl RenderType {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderType::Helm => "helm",
            RenderType::Kustomize => "kustomize",
            RenderType::Both => "both",
        }
    }
}

/// A rendered manifest for one cluster
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RenderedFile {
    /// Output path relative to the template's render root
    pub path: String,
    pub cluster: String,
    #[serde(rename = "type")]
    pub render_type: RenderType,
    /// Time of the last successful render (RFC3339)
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, schemars::JsonSchema, PartialEq, Eq, Hash)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub fn from_bool(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Kubernetes condition
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
