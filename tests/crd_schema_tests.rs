//! # CRD Schema Tests
//!
//! Wire format of the ApplicationTemplate resource and the generated CRD.

use application_template_controller::crd::{
    ApplicationTemplate, ApplicationTemplateStatus, Condition, ConditionStatus, MatchedBy,
    MatchedCluster, Phase, RenderType, RenderedFile,
};
use kube::{CustomResourceExt, Resource};
use std::collections::BTreeMap;

const EXAMPLE: &str = r#"
apiVersion: templates.gitops.dev/v1alpha1
kind: ApplicationTemplate
metadata:
  name: payments
  namespace: platform
spec:
  name: payments
  repoURL: https://github.com/example/payments-deploy.git
  helm:
    chart: charts/payments
    version: 1.4.2
    defaultValuesPath: values.yaml
    renderTargets:
      - valuesPath: envs/prod/values.yaml
        destinationCluster:
          matchLabels:
            env: prod
  kustomize:
    renderTargets:
      - path: envs/staging
        destinationCluster:
          name: staging-eu-1
"#;

#[test]
fn test_example_resource_deserializes() {
    let template: ApplicationTemplate =
        serde_yaml::from_str(EXAMPLE).expect("example should parse in test");

    assert_eq!(template.spec.name, "payments");
    assert_eq!(
        template.spec.repo_url,
        "https://github.com/example/payments-deploy.git"
    );
    assert_eq!(template.spec.target_revision, "main");

    let helm = template.spec.helm.expect("helm config in test");
    assert_eq!(helm.chart, "charts/payments");
    assert_eq!(helm.default_values_path.as_deref(), Some("values.yaml"));
    assert_eq!(helm.render_targets.len(), 1);
    assert_eq!(
        helm.render_targets[0].destination_cluster.match_labels,
        BTreeMap::from([("env".to_string(), "prod".to_string())])
    );

    let kustomize = template.spec.kustomize.expect("kustomize config in test");
    assert_eq!(
        kustomize.render_targets[0].destination_cluster.cluster_name(),
        Some("staging-eu-1")
    );
}

#[test]
fn test_spec_serializes_repo_url_key() {
    let template: ApplicationTemplate =
        serde_yaml::from_str(EXAMPLE).expect("example should parse in test");
    let value = serde_json::to_value(&template.spec).expect("spec serializes in test");
    assert!(value.get("repoURL").is_some());
    assert!(value.get("repoUrl").is_none());
    assert_eq!(value["targetRevision"], "main");
}

#[test]
fn test_generated_crd_metadata() {
    let crd = ApplicationTemplate::crd();
    assert_eq!(crd.spec.group, "templates.gitops.dev");
    assert_eq!(crd.spec.names.kind, "ApplicationTemplate");
    assert_eq!(crd.spec.scope, "Namespaced");
    assert!(crd
        .spec
        .names
        .short_names
        .as_ref()
        .is_some_and(|names| names.iter().any(|n| n == "apptemp")));

    let version = &crd.spec.versions[0];
    assert_eq!(version.name, "v1alpha1");
    assert!(version
        .subresources
        .as_ref()
        .and_then(|s| s.status.as_ref())
        .is_some());
    assert_eq!(ApplicationTemplate::kind(&()), "ApplicationTemplate");
}

#[test]
fn test_status_wire_format() {
    let status = ApplicationTemplateStatus {
        phase: Some(Phase::Ready),
        matched_clusters: vec![MatchedCluster {
            name: "prod-eu".to_string(),
            matched_by: MatchedBy::Label,
            matched_labels: BTreeMap::from([("env".to_string(), "prod".to_string())]),
            helm_values_path: Some("envs/prod/values.yaml".to_string()),
            kustomize_path: None,
            rendered: true,
        }],
        rendered_files: vec![RenderedFile {
            path: "prod-eu/envs/prod/manifest.yaml".to_string(),
            cluster: "prod-eu".to_string(),
            render_type: RenderType::Both,
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
        }],
        conditions: vec![Condition {
            r#type: "Ready".to_string(),
            status: ConditionStatus::True,
            last_transition_time: Some("2026-01-01T00:00:00+00:00".to_string()),
            reason: Some("AllRendered".to_string()),
            message: None,
        }],
        observed_generation: Some(3),
        ..Default::default()
    };

    let value = serde_json::to_value(&status).expect("status serializes in test");
    assert_eq!(value["phase"], "Ready");
    assert_eq!(value["observedGeneration"], 3);
    assert_eq!(value["matchedClusters"][0]["matchedBy"], "label");
    assert_eq!(value["matchedClusters"][0]["helmValuesPath"], "envs/prod/values.yaml");
    assert!(value["matchedClusters"][0].get("kustomizePath").is_none());
    assert_eq!(value["renderedFiles"][0]["type"], "both");
    assert_eq!(value["conditions"][0]["type"], "Ready");
    assert_eq!(value["conditions"][0]["status"], "True");
    assert!(value["conditions"][0].get("message").is_none());
    assert!(value.get("nextReconcileTime").is_none());

    let back: ApplicationTemplateStatus =
        serde_json::from_value(value).expect("status deserializes in test");
    assert_eq!(back, status);
}

#[test]
fn test_empty_status_deserializes() {
    let status: ApplicationTemplateStatus =
        serde_json::from_str("{}").expect("empty status parses in test");
    assert!(status.phase.is_none());
    assert!(status.rendered_files.is_empty());
    assert!(status.condition("Ready").is_none());
}
