//! # Cluster Matching
//!
//! Resolves a [`ClusterSelector`] against an immutable snapshot of the cluster
//! registry. Evaluation is pure: the same selector and snapshot always yield the
//! same set.
//!
//! - A non-empty `name` is authoritative; `matchLabels` is ignored.
//! - Otherwise every cluster whose labels are a superset of `matchLabels` matches.
//! - A selector with neither matches nothing and is reported as unselective.

mod registry;

pub use registry::{ArgoCdClusterRegistry, ClusterRegistry, RegistryError};

use crate::crd::{ClusterSelector, MatchedBy};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// A cluster known to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterRef {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

impl ClusterRef {
    pub fn new<I, K, V>(name: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Registry contents frozen for the duration of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    clusters: BTreeMap<String, ClusterRef>,
}

impl RegistrySnapshot {
    /// Index clusters by name. When the registry reports a name twice the first entry wins.
    pub fn new(clusters: impl IntoIterator<Item = ClusterRef>) -> Self {
        let mut indexed = BTreeMap::new();
        for cluster in clusters {
            if indexed.contains_key(&cluster.name) {
                warn!(cluster = %cluster.name, "Cluster registry lists a cluster twice, keeping the first entry");
                continue;
            }
            indexed.insert(cluster.name.clone(), cluster);
        }
        Self { clusters: indexed }
    }

    pub fn get(&self, name: &str) -> Option<&ClusterRef> {
        self.clusters.get(name)
    }

    /// Clusters in name order
    pub fn iter(&self) -> impl Iterator<Item = &ClusterRef> {
        self.clusters.values()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Result of evaluating one selector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorMatch {
    pub clusters: BTreeSet<String>,
    /// `None` when the selector was unselective
    pub matched_by: Option<MatchedBy>,
    /// The selector's labels, echoed for label matches
    pub matched_labels: BTreeMap<String, String>,
}

impl SelectorMatch {
    pub fn is_unselective(&self) -> bool {
        self.matched_by.is_none()
    }
}

/// Evaluate a selector against a registry snapshot
pub fn evaluate(selector: &ClusterSelector, snapshot: &RegistrySnapshot) -> SelectorMatch {
    if let Some(name) = selector.cluster_name() {
        return SelectorMatch {
            clusters: snapshot
                .get(name)
                .map(|cluster| cluster.name.clone())
                .into_iter()
                .collect(),
            matched_by: Some(MatchedBy::Name),
            matched_labels: BTreeMap::new(),
        };
    }

    if selector.match_labels.is_empty() {
        return SelectorMatch::default();
    }

    SelectorMatch {
        clusters: snapshot
            .iter()
            .filter(|cluster| labels_match(&selector.match_labels, &cluster.labels))
            .map(|cluster| cluster.name.clone())
            .collect(),
        matched_by: Some(MatchedBy::Label),
        matched_labels: selector.match_labels.clone(),
    }
}

/// True when every required key is present in `labels` with an equal value
///
/// An empty requirement is vacuously satisfied; [`evaluate`] never calls this with one.
pub fn labels_match(required: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    required
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fleet() -> RegistrySnapshot {
        RegistrySnapshot::new([
            ClusterRef::new("c1", [("env", "prod"), ("region", "eu")]),
            ClusterRef::new("c2", [("env", "dev")]),
            ClusterRef::new("c3", [("env", "prod"), ("region", "us")]),
        ])
    }

    #[test]
    fn test_label_selector_matches_superset_only() {
        let snapshot = RegistrySnapshot::new([
            ClusterRef::new("c1", [("env", "prod")]),
            ClusterRef::new("c2", [("env", "dev")]),
        ]);
        let result = evaluate(&ClusterSelector::by_labels([("env", "prod")]), &snapshot);

        assert_eq!(result.clusters, BTreeSet::from(["c1".to_string()]));
        assert_eq!(result.matched_by, Some(MatchedBy::Label));
        assert_eq!(
            result.matched_labels,
            BTreeMap::from([("env".to_string(), "prod".to_string())])
        );
    }

    #[test]
    fn test_label_selector_requires_every_pair() {
        let selector = ClusterSelector::by_labels([("env", "prod"), ("region", "eu")]);
        let result = evaluate(&selector, &fleet());
        assert_eq!(result.clusters, BTreeSet::from(["c1".to_string()]));

        let selector = ClusterSelector::by_labels([("env", "prod"), ("tier", "gold")]);
        assert!(evaluate(&selector, &fleet()).clusters.is_empty());
    }

    #[test]
    fn test_name_is_authoritative_over_labels() {
        let selector = ClusterSelector {
            name: Some("c2".to_string()),
            match_labels: BTreeMap::from([("env".to_string(), "prod".to_string())]),
        };
        let result = evaluate(&selector, &fleet());

        assert_eq!(result.clusters, BTreeSet::from(["c2".to_string()]));
        assert_eq!(result.matched_by, Some(MatchedBy::Name));
        assert!(result.matched_labels.is_empty());
    }

    #[test]
    fn test_name_absent_from_registry_is_empty_match() {
        let result = evaluate(&ClusterSelector::by_name("missing"), &fleet());
        assert!(result.clusters.is_empty());
        assert_eq!(result.matched_by, Some(MatchedBy::Name));
        assert!(!result.is_unselective());
    }

    #[test]
    fn test_empty_name_falls_through_to_labels() {
        let selector = ClusterSelector {
            name: Some(String::new()),
            match_labels: BTreeMap::from([("env".to_string(), "dev".to_string())]),
        };
        let result = evaluate(&selector, &fleet());
        assert_eq!(result.clusters, BTreeSet::from(["c2".to_string()]));
        assert_eq!(result.matched_by, Some(MatchedBy::Label));
    }

    #[test]
    fn test_unselective_selector_matches_nothing() {
        let result = evaluate(&ClusterSelector::default(), &fleet());
        assert!(result.clusters.is_empty());
        assert!(result.is_unselective());
    }

    #[test]
    fn test_evaluation_ignores_registry_order() {
        let reversed = RegistrySnapshot::new([
            ClusterRef::new("c3", [("env", "prod"), ("region", "us")]),
            ClusterRef::new("c2", [("env", "dev")]),
            ClusterRef::new("c1", [("env", "prod"), ("region", "eu")]),
        ]);
        let selector = ClusterSelector::by_labels([("env", "prod")]);
        assert_eq!(evaluate(&selector, &fleet()), evaluate(&selector, &reversed));
    }

    #[test]
    fn test_snapshot_keeps_first_duplicate() {
        let snapshot = RegistrySnapshot::new([
            ClusterRef::new("c1", [("env", "prod")]),
            ClusterRef::new("c1", [("env", "dev")]),
        ]);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot.get("c1").map(|c| c.labels.get("env").cloned()),
            Some(Some("prod".to_string()))
        );
    }
}
