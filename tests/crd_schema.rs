//! Checks on the generated IndexerCluster CRD.
//!
//! Run with: cargo test --test crd_schema

use kube::CustomResourceExt;
use splunk_k8s::crd::IndexerCluster;

#[test]
fn crd_serializes_to_yaml() {
    let yaml = serde_yaml::to_string(&IndexerCluster::crd()).expect("CRD renders as YAML");

    assert!(yaml.contains("name: indexerclusters.enterprise.splunk.com"));
    assert!(yaml.contains("kind: IndexerCluster"));
    assert!(yaml.contains("- idxc"));
}

#[test]
fn crd_schema_exposes_spec_and_status_fields() {
    let crd = IndexerCluster::crd();
    let version = &crd.spec.versions[0];
    assert_eq!(version.name, "v1alpha2");

    let schema = serde_json::to_value(version.schema.as_ref().expect("schema present"))
        .expect("schema serializes");
    let properties = &schema["openAPIV3Schema"]["properties"];

    let spec = &properties["spec"]["properties"];
    for field in ["replicas", "image", "imagePullPolicy", "etcStorage", "varStorage"] {
        assert!(spec.get(field).is_some(), "spec.{field} missing from schema");
    }

    let status = &properties["status"]["properties"];
    for field in ["phase", "clusterMasterPhase", "readyReplicas", "selector"] {
        assert!(status.get(field).is_some(), "status.{field} missing from schema");
    }
}

#[test]
fn scale_subresource_uses_status_selector() {
    let crd = IndexerCluster::crd();
    let scale = crd.spec.versions[0]
        .subresources
        .as_ref()
        .and_then(|s| s.scale.as_ref())
        .expect("scale subresource");

    assert_eq!(scale.spec_replicas_path, ".spec.replicas");
    assert_eq!(scale.status_replicas_path, ".status.replicas");
    assert_eq!(scale.label_selector_path.as_deref(), Some(".status.selector"));
}
