//! # Render Planning
//!
//! Expands a template's Helm and Kustomize render targets into a flat list of
//! render jobs, one per (cluster, kind, path). The planner is pure: it only
//! looks at the spec and the registry snapshot taken for this pass.
//!
//! Every job also carries its output path, `{cluster}/{dir}/manifest.yaml`,
//! where `dir` is the overlay directory for Kustomize and the directory holding
//! the values file for Helm. Helm and Kustomize jobs for one cluster share an
//! output file exactly when the values file sits inside the overlay directory.
//!
//! Helm targets whose values files live in the same directory would collide
//! under that rule. Each of them renders into a directory named after its
//! values file instead (`envs/prod/eu.yaml` → `envs/prod/eu.yaml/manifest.yaml`).
//! A path cannot be both a file and a directory, so these never clash with
//! another output.

use super::matching::{evaluate, RegistrySnapshot};
use super::validation::{normalize_repo_path, ValidationError};
use crate::crd::{ApplicationTemplateSpec, ClusterSelector, HelmConfig, KustomizeConfig, MatchedBy, RenderType};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// File name of every rendered manifest
pub const OUTPUT_FILE_NAME: &str = "manifest.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RenderKind {
    Helm,
    Kustomize,
}

impl RenderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderKind::Helm => "helm",
            RenderKind::Kustomize => "kustomize",
        }
    }

    pub fn render_type(self) -> RenderType {
        match self {
            RenderKind::Helm => RenderType::Helm,
            RenderKind::Kustomize => RenderType::Kustomize,
        }
    }
}

impl fmt::Display for RenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a render job
///
/// `path` is the values file for Helm and the overlay directory for Kustomize,
/// normalised relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobKey {
    pub cluster: String,
    pub kind: RenderKind,
    pub path: String,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.cluster, self.kind, self.path)
    }
}

/// Chart coordinates shared by every Helm job of a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelmChart {
    pub chart: String,
    pub version: String,
    pub repository: Option<String>,
    /// Normalised default values path, lowest precedence
    pub default_values_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    Helm(HelmChart),
    Kustomize,
}

/// One unit of rendering work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub key: JobKey,
    pub matched_by: MatchedBy,
    pub matched_labels: BTreeMap<String, String>,
    pub source: JobSource,
    /// Output path relative to the template's render root
    pub output_path: String,
}

/// Non-fatal configuration problems found while planning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Neither Helm nor Kustomize is configured
    NoRenderConfig,
    /// A render target's selector has neither a name nor labels
    UnselectiveSelector { kind: RenderKind, path: String },
    /// A path was rejected; the target (or the whole Helm config) is skipped
    InvalidPath {
        kind: RenderKind,
        error: ValidationError,
    },
    /// Helm is configured without a chart or version
    IncompleteHelmConfig,
}

impl ConfigWarning {
    pub fn reason(&self) -> &'static str {
        match self {
            ConfigWarning::NoRenderConfig => "NoRenderConfig",
            ConfigWarning::UnselectiveSelector { .. } => "UnselectiveSelector",
            ConfigWarning::InvalidPath { .. } => "InvalidPath",
            ConfigWarning::IncompleteHelmConfig => "IncompleteHelmConfig",
        }
    }
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::NoRenderConfig => {
                f.write_str("neither helm nor kustomize is configured, nothing will be rendered")
            }
            ConfigWarning::UnselectiveSelector { kind, path } => write!(
                f,
                "{kind} target '{path}' has a destinationCluster with neither name nor matchLabels and matches no cluster"
            ),
            ConfigWarning::InvalidPath { kind, error } => {
                write!(f, "{kind} target skipped: {error}")
            }
            ConfigWarning::IncompleteHelmConfig => {
                f.write_str("helm chart and version are required, helm targets skipped")
            }
        }
    }
}

/// Jobs and warnings for one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderPlan {
    /// Ordered by [`JobKey`], free of duplicate keys
    pub jobs: Vec<RenderJob>,
    pub warnings: Vec<ConfigWarning>,
}

impl RenderPlan {
    /// Distinct clusters with at least one job
    pub fn clusters(&self) -> BTreeSet<&str> {
        self.jobs.iter().map(|job| job.key.cluster.as_str()).collect()
    }
}

/// Expand a template spec into render jobs against a registry snapshot
pub fn plan(spec: &ApplicationTemplateSpec, snapshot: &RegistrySnapshot) -> RenderPlan {
    let mut planner = Planner {
        snapshot,
        jobs: BTreeMap::new(),
        warnings: Vec::new(),
        shared_helm_dirs: BTreeSet::new(),
    };

    if spec.has_no_render_config() {
        planner.warnings.push(ConfigWarning::NoRenderConfig);
    }
    if let Some(helm) = &spec.helm {
        planner.plan_helm(helm);
    }
    if let Some(kustomize) = &spec.kustomize {
        planner.plan_kustomize(kustomize);
    }

    RenderPlan {
        jobs: planner.jobs.into_values().collect(),
        warnings: planner.warnings,
    }
}

struct Planner<'a> {
    snapshot: &'a RegistrySnapshot,
    jobs: BTreeMap<JobKey, RenderJob>,
    warnings: Vec<ConfigWarning>,
    /// Directories holding more than one distinct Helm values file
    shared_helm_dirs: BTreeSet<String>,
}

impl Planner<'_> {
    fn plan_helm(&mut self, helm: &HelmConfig) {
        if helm.chart.trim().is_empty() || helm.version.trim().is_empty() {
            self.warnings.push(ConfigWarning::IncompleteHelmConfig);
            return;
        }

        let default_values_path = match helm
            .default_values_path
            .as_deref()
            .filter(|path| !path.trim().is_empty())
            .map(|path| normalize_repo_path(path, "defaultValuesPath", false))
            .transpose()
        {
            Ok(path) => path,
            Err(error) => {
                self.warnings.push(ConfigWarning::InvalidPath {
                    kind: RenderKind::Helm,
                    error,
                });
                return;
            }
        };

        let chart = HelmChart {
            chart: helm.chart.trim().to_string(),
            version: helm.version.trim().to_string(),
            repository: helm
                .repository
                .as_deref()
                .map(str::trim)
                .filter(|repo| !repo.is_empty())
                .map(str::to_string),
            default_values_path,
        };

        self.shared_helm_dirs = shared_values_dirs(
            helm.render_targets
                .iter()
                .filter_map(|target| normalize_repo_path(&target.values_path, "valuesPath", false).ok()),
        );

        for target in &helm.render_targets {
            match normalize_repo_path(&target.values_path, "valuesPath", false) {
                Ok(values_path) => self.expand(
                    RenderKind::Helm,
                    &values_path,
                    &target.destination_cluster,
                    &JobSource::Helm(chart.clone()),
                ),
                Err(error) => self.warnings.push(ConfigWarning::InvalidPath {
                    kind: RenderKind::Helm,
                    error,
                }),
            }
        }
    }

    fn plan_kustomize(&mut self, kustomize: &KustomizeConfig) {
        for target in &kustomize.render_targets {
            match normalize_repo_path(&target.path, "path", true) {
                Ok(overlay_path) => self.expand(
                    RenderKind::Kustomize,
                    &overlay_path,
                    &target.destination_cluster,
                    &JobSource::Kustomize,
                ),
                Err(error) => self.warnings.push(ConfigWarning::InvalidPath {
                    kind: RenderKind::Kustomize,
                    error,
                }),
            }
        }
    }

    fn expand(&mut self, kind: RenderKind, path: &str, selector: &ClusterSelector, source: &JobSource) {
        let matched = evaluate(selector, self.snapshot);
        let Some(matched_by) = matched.matched_by else {
            self.warnings.push(ConfigWarning::UnselectiveSelector {
                kind,
                path: path.to_string(),
            });
            return;
        };

        for cluster in matched.clusters {
            let key = JobKey {
                cluster,
                kind,
                path: path.to_string(),
            };
            let shared_dir = kind == RenderKind::Helm && self.shared_helm_dirs.contains(values_dir(path));
            // First target to produce a key wins
            self.jobs.entry(key).or_insert_with_key(|key| RenderJob {
                output_path: if shared_dir {
                    values_file_output_path(&key.cluster, path)
                } else {
                    output_path(&key.cluster, kind, path)
                },
                key: key.clone(),
                matched_by,
                matched_labels: matched.matched_labels.clone(),
                source: source.clone(),
            });
        }
    }
}

/// Directory holding a values file, `""` for the repository root
fn values_dir(values_path: &str) -> &str {
    values_path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

fn shared_values_dirs(values_paths: impl Iterator<Item = String>) -> BTreeSet<String> {
    let distinct: BTreeSet<String> = values_paths.collect();
    let mut per_dir: BTreeMap<&str, usize> = BTreeMap::new();
    for path in &distinct {
        *per_dir.entry(values_dir(path)).or_default() += 1;
    }
    per_dir
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(dir, _)| dir.to_string())
        .collect()
}

/// Output path of a job, relative to the template's render root
pub fn output_path(cluster: &str, kind: RenderKind, source_path: &str) -> String {
    let dir = match kind {
        RenderKind::Helm => values_dir(source_path),
        RenderKind::Kustomize => source_path,
    };
    let cluster = cluster_dir_name(cluster);
    if dir.is_empty() {
        format!("{cluster}/{OUTPUT_FILE_NAME}")
    } else {
        format!("{cluster}/{dir}/{OUTPUT_FILE_NAME}")
    }
}

/// Output path of a Helm job that renders into a directory named after its values file
pub fn values_file_output_path(cluster: &str, values_path: &str) -> String {
    format!("{}/{values_path}/{OUTPUT_FILE_NAME}", cluster_dir_name(cluster))
}

/// Cluster names become a single directory component, percent-encoded so that
/// distinct names never share a directory
fn cluster_dir_name(cluster: &str) -> String {
    match cluster {
        "" => "%".to_string(),
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(cluster).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::matching::ClusterRef;
    use crate::crd::{HelmRenderTarget, KustomizeRenderTarget};

    fn spec(helm: Option<HelmConfig>, kustomize: Option<KustomizeConfig>) -> ApplicationTemplateSpec {
        ApplicationTemplateSpec {
            name: "app".to_string(),
            repo_url: "https://git.example.com/app.git".to_string(),
            target_revision: "main".to_string(),
            helm,
            kustomize,
        }
    }

    fn helm(targets: Vec<HelmRenderTarget>) -> HelmConfig {
        HelmConfig {
            chart: "app".to_string(),
            version: "1.0".to_string(),
            repository: None,
            default_values_path: None,
            render_targets: targets,
        }
    }

    fn helm_target(values_path: &str, selector: ClusterSelector) -> HelmRenderTarget {
        HelmRenderTarget {
            values_path: values_path.to_string(),
            destination_cluster: selector,
        }
    }

    fn kustomize_target(path: &str, selector: ClusterSelector) -> KustomizeRenderTarget {
        KustomizeRenderTarget {
            path: path.to_string(),
            destination_cluster: selector,
        }
    }

    fn fleet() -> RegistrySnapshot {
        RegistrySnapshot::new([
            ClusterRef::new("cluster-a", [("env", "prod"), ("region", "eu")]),
            ClusterRef::new("cluster-b", [("env", "prod"), ("region", "us")]),
            ClusterRef::new("cluster-c", [("env", "dev")]),
        ])
    }

    #[test]
    fn test_single_helm_target_by_name() {
        let plan = plan(
            &spec(
                Some(helm(vec![helm_target(
                    "prod/values.yaml",
                    ClusterSelector::by_name("cluster-a"),
                )])),
                None,
            ),
            &fleet(),
        );

        assert_eq!(plan.jobs.len(), 1);
        let job = &plan.jobs[0];
        assert_eq!(job.key.cluster, "cluster-a");
        assert_eq!(job.key.kind, RenderKind::Helm);
        assert_eq!(job.key.path, "prod/values.yaml");
        assert_eq!(job.matched_by, MatchedBy::Name);
        assert_eq!(job.output_path, "cluster-a/prod/manifest.yaml");
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_overlapping_selectors_are_deduplicated() {
        let plan = plan(
            &spec(
                Some(helm(vec![
                    helm_target("prod/values.yaml", ClusterSelector::by_labels([("env", "prod")])),
                    helm_target("./prod/values.yaml", ClusterSelector::by_labels([("region", "eu")])),
                    helm_target("prod/values.yaml", ClusterSelector::by_name("cluster-a")),
                ])),
                None,
            ),
            &fleet(),
        );

        let keys: Vec<String> = plan.jobs.iter().map(|job| job.key.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "cluster-a/helm:prod/values.yaml".to_string(),
                "cluster-b/helm:prod/values.yaml".to_string(),
            ]
        );
        // The first target that produced cluster-a was the label selector
        assert_eq!(plan.jobs[0].matched_by, MatchedBy::Label);
    }

    #[test]
    fn test_helm_and_kustomize_on_same_cluster_yield_two_jobs() {
        let plan = plan(
            &spec(
                Some(helm(vec![helm_target(
                    "helm/prod.yaml",
                    ClusterSelector::by_name("cluster-a"),
                )])),
                Some(KustomizeConfig {
                    render_targets: vec![kustomize_target(
                        "overlays/prod",
                        ClusterSelector::by_name("cluster-a"),
                    )],
                }),
            ),
            &fleet(),
        );

        assert_eq!(plan.jobs.len(), 2);
        assert_eq!(plan.jobs[0].output_path, "cluster-a/helm/manifest.yaml");
        assert_eq!(plan.jobs[1].output_path, "cluster-a/overlays/prod/manifest.yaml");
    }

    #[test]
    fn test_values_inside_overlay_share_output_path() {
        assert_eq!(
            output_path("cluster-a", RenderKind::Helm, "envs/prod/values.yaml"),
            output_path("cluster-a", RenderKind::Kustomize, "envs/prod")
        );
        assert_eq!(
            output_path("cluster-a", RenderKind::Helm, "values.yaml"),
            "cluster-a/manifest.yaml"
        );
        assert_eq!(
            output_path("https://10.0.0.1:6443", RenderKind::Kustomize, ""),
            "https%3A%2F%2F10.0.0.1%3A6443/manifest.yaml"
        );
    }

    #[test]
    fn test_cluster_directory_names_are_distinct() {
        let names = ["a/b", "a:b", "a_b", "a%2Fb", "..", ""];
        let dirs: BTreeSet<String> = names.iter().map(|name| cluster_dir_name(name)).collect();
        assert_eq!(dirs.len(), names.len());
        assert!(dirs.iter().all(|dir| !dir.contains('/') && dir != ".." && !dir.is_empty()));
    }

    #[test]
    fn test_helm_targets_sharing_a_directory_get_distinct_outputs() {
        let spec = spec(
            Some(helm(vec![
                helm_target("values-prod.yaml", ClusterSelector::by_name("cluster-a")),
                helm_target("values-eu.yaml", ClusterSelector::by_labels([("env", "prod")])),
                helm_target("envs/dev/values.yaml", ClusterSelector::by_name("cluster-a")),
            ])),
            Some(KustomizeConfig {
                render_targets: vec![kustomize_target("envs/dev", ClusterSelector::by_name("cluster-a"))],
            }),
        );
        let plan = plan(&spec, &fleet());

        let outputs: BTreeMap<(&str, RenderKind, &str), &str> = plan
            .jobs
            .iter()
            .map(|job| {
                (
                    (job.key.cluster.as_str(), job.key.kind, job.key.path.as_str()),
                    job.output_path.as_str(),
                )
            })
            .collect();
        assert_eq!(
            outputs[&("cluster-a", RenderKind::Helm, "values-prod.yaml")],
            "cluster-a/values-prod.yaml/manifest.yaml"
        );
        assert_eq!(
            outputs[&("cluster-a", RenderKind::Helm, "values-eu.yaml")],
            "cluster-a/values-eu.yaml/manifest.yaml"
        );
        // A lone values file keeps sharing its overlay's output
        assert_eq!(
            outputs[&("cluster-a", RenderKind::Helm, "envs/dev/values.yaml")],
            outputs[&("cluster-a", RenderKind::Kustomize, "envs/dev")]
        );

        let helm_outputs: BTreeSet<(&str, &str)> = plan
            .jobs
            .iter()
            .filter(|job| job.key.kind == RenderKind::Helm)
            .map(|job| (job.key.cluster.as_str(), job.output_path.as_str()))
            .collect();
        let helm_jobs = plan.jobs.iter().filter(|job| job.key.kind == RenderKind::Helm).count();
        assert_eq!(helm_outputs.len(), helm_jobs);
    }

    #[test]
    fn test_no_match_is_an_empty_plan() {
        let plan = plan(
            &spec(
                None,
                Some(KustomizeConfig {
                    render_targets: vec![kustomize_target(
                        "overlays/qa",
                        ClusterSelector::by_labels([("env", "qa")]),
                    )],
                }),
            ),
            &fleet(),
        );
        assert!(plan.jobs.is_empty());
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_configuration_warnings() {
        let empty = plan(&spec(None, None), &fleet());
        assert_eq!(empty.warnings, vec![ConfigWarning::NoRenderConfig]);

        let plan = plan(
            &spec(
                Some(helm(vec![
                    helm_target("prod/values.yaml", ClusterSelector::default()),
                    helm_target("../escape.yaml", ClusterSelector::by_name("cluster-a")),
                ])),
                None,
            ),
            &fleet(),
        );
        assert!(plan.jobs.is_empty());
        let reasons: Vec<&str> = plan.warnings.iter().map(ConfigWarning::reason).collect();
        assert_eq!(reasons, vec!["UnselectiveSelector", "InvalidPath"]);
    }

    #[test]
    fn test_incomplete_helm_config_skips_helm_targets() {
        let mut config = helm(vec![helm_target(
            "prod/values.yaml",
            ClusterSelector::by_name("cluster-a"),
        )]);
        config.version = String::new();

        let plan = plan(&spec(Some(config), None), &fleet());
        assert!(plan.jobs.is_empty());
        assert_eq!(plan.warnings, vec![ConfigWarning::IncompleteHelmConfig]);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let template = spec(
            Some(helm(vec![helm_target(
                "prod/values.yaml",
                ClusterSelector::by_labels([("env", "prod")]),
            )])),
            Some(KustomizeConfig {
                render_targets: vec![kustomize_target("dev", ClusterSelector::by_labels([("env", "dev")]))],
            }),
        );
        assert_eq!(plan(&template, &fleet()), plan(&template, &fleet()));
    }
}
