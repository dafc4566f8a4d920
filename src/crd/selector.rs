//! # Cluster Selector

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Selects destination clusters by exact name or by labels
///
/// When `name` is set it is authoritative and `matchLabels` is ignored.
/// A selector with neither set matches nothing.
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSelector {
    /// Name of an ArgoCD cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Labels that must all be present on the cluster with equal values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

impl ClusterSelector {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            match_labels: BTreeMap::new(),
        }
    }

    pub fn by_labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: None,
            match_labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Non-empty name, if any
    pub fn cluster_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }
}
