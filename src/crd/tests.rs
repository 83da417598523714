//! Manifest-level tests for the IndexerCluster CRD

use kube::CustomResourceExt;

use super::*;

const MANIFEST: &str = r#"
apiVersion: enterprise.splunk.com/v1alpha2
kind: IndexerCluster
metadata:
  name: example
  namespace: splunk
  finalizers:
    - enterprise.splunk.com/delete-pvc
spec:
  replicas: 3
  image: splunk/splunk:9.1.2
  imagePullPolicy: Always
  etcStorage: 20Gi
  varStorage: 500Gi
  resources:
    requests:
      cpu: "2"
      memory: 4Gi
  defaults: |-
    splunk:
      site: site1
"#;

#[test]
fn test_manifest_deserializes_flattened_common_spec() {
    let cluster: IndexerCluster = serde_yaml::from_str(MANIFEST).unwrap();

    assert_eq!(cluster.spec.replicas, 3);
    assert_eq!(cluster.spec.common.spec.image, "splunk/splunk:9.1.2");
    assert_eq!(cluster.spec.common.spec.image_pull_policy, "Always");
    assert_eq!(cluster.spec.common.etc_storage, "20Gi");
    assert_eq!(cluster.spec.common.spec.resources.requests.cpu, "2");
    assert!(cluster.spec.common.spec.resources.limits.cpu.is_empty());
    assert!(cluster.spec.common.defaults.contains("site1"));
    assert!(cluster.status.is_none());
}

#[test]
fn test_validation_keeps_user_values() {
    let mut cluster: IndexerCluster = serde_yaml::from_str(MANIFEST).unwrap();
    cluster.spec.validate().unwrap();

    let resources = &cluster.spec.common.spec.resources;
    assert_eq!(resources.requests.cpu, "2");
    assert_eq!(resources.requests.memory, "4Gi");
    assert_eq!(resources.limits.cpu, "4");
    assert_eq!(cluster.spec.common.var_storage, "500Gi");
}

#[test]
fn test_status_serializes_camel_case() {
    let status = IndexerClusterStatus {
        phase: Phase::Ready,
        cluster_master_phase: Phase::Updating,
        replicas: 3,
        ready_replicas: 2,
        selector: "app.kubernetes.io/instance=splunk-example-indexer".to_string(),
    };
    let value = serde_json::to_value(&status).unwrap();

    assert_eq!(value["phase"], "Ready");
    assert_eq!(value["clusterMasterPhase"], "Updating");
    assert_eq!(value["readyReplicas"], 2);
}

#[test]
fn test_crd_metadata() {
    let crd = IndexerCluster::crd();

    assert_eq!(
        crd.metadata.name.as_deref(),
        Some("indexerclusters.enterprise.splunk.com")
    );
    assert_eq!(crd.spec.names.kind, "IndexerCluster");
    assert_eq!(crd.spec.versions[0].name, "v1alpha2");
    let subresources = crd.spec.versions[0].subresources.as_ref().unwrap();
    assert!(subresources.status.is_some());
    assert!(subresources.scale.is_some());
}
