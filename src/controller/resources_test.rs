//! Unit tests for Kubernetes resource builders.
//!
//! Run with: `cargo test -p splunk-k8s resources_test`

#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::StatefulSet;
    use k8s_openapi::api::core::v1::Container;
    use kube::api::ObjectMeta;
    use kube::ResourceExt;

    use crate::controller::resources::*;
    use crate::crd::{IndexerCluster, IndexerClusterSpec, InstanceType};
    use crate::error::Error;

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn validated_cluster(replicas: i32) -> IndexerCluster {
        let mut spec = IndexerClusterSpec {
            replicas,
            ..Default::default()
        };
        spec.validate().unwrap();
        IndexerCluster {
            metadata: ObjectMeta {
                name: Some("idx".to_string()),
                namespace: Some("splunk".to_string()),
                uid: Some("uid-1234".to_string()),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    fn splunk_container(sts: &StatefulSet) -> &Container {
        &sts.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
    }

    fn env_value(container: &Container, name: &str) -> Option<String> {
        container
            .env
            .as_ref()?
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value.clone())
    }

    // -----------------------------------------------------------------------
    // Names and labels
    // -----------------------------------------------------------------------

    #[test]
    fn test_resource_names() {
        let cr = validated_cluster(3);
        assert_eq!(statefulset_name(&cr, InstanceType::Indexer), "splunk-idx-indexer");
        assert_eq!(
            statefulset_name(&cr, InstanceType::ClusterMaster),
            "splunk-idx-cluster-master"
        );
        assert_eq!(
            service_name(&cr, InstanceType::Indexer, true),
            "splunk-idx-indexer-headless"
        );
        assert_eq!(
            service_name(&cr, InstanceType::ClusterMaster, false),
            "splunk-idx-cluster-master-service"
        );
        assert_eq!(secret_name(&cr), "splunk-idx-secrets");
    }

    #[test]
    fn test_labels_match_status_selector() {
        let cr = validated_cluster(3);
        let labels = standard_labels(&cr, InstanceType::Indexer);
        let (key, value) = cr.indexer_selector().split_once('=').map(|(k, v)| (k.to_string(), v.to_string())).unwrap();

        assert_eq!(labels.get(&key), Some(&value));
        assert_eq!(labels["app.kubernetes.io/managed-by"], MANAGED_BY);
        assert_eq!(
            standard_labels(&cr, InstanceType::ClusterMaster)["app.kubernetes.io/part-of"],
            "splunk-idx-indexer"
        );
    }

    #[test]
    fn test_owner_reference_points_at_cluster() {
        let cr = validated_cluster(1);
        let owner = owner_reference(&cr);
        assert_eq!(owner.kind, "IndexerCluster");
        assert_eq!(owner.api_version, "enterprise.splunk.com/v1alpha2");
        assert_eq!(owner.uid, "uid-1234");
        assert_eq!(owner.controller, Some(true));
    }

    // -----------------------------------------------------------------------
    // Services
    // -----------------------------------------------------------------------

    #[test]
    fn test_headless_service_publishes_not_ready_addresses() {
        let cr = validated_cluster(3);
        let svc = build_service(&cr, InstanceType::Indexer, true);
        let spec = svc.spec.unwrap();

        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(spec.publish_not_ready_addresses, Some(true));
        let ports: Vec<i32> = spec.ports.unwrap().iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![8000, 8089, 8088, 9997, 9887]);
    }

    #[test]
    fn test_master_service_is_routable() {
        let cr = validated_cluster(3);
        let svc = build_service(&cr, InstanceType::ClusterMaster, false);
        assert_eq!(svc.namespace().as_deref(), Some("splunk"));

        let spec = svc.spec.unwrap();
        assert!(spec.cluster_ip.is_none());
        assert_eq!(spec.ports.unwrap().len(), 2);
    }

    // -----------------------------------------------------------------------
    // StatefulSets
    // -----------------------------------------------------------------------

    #[test]
    fn test_indexer_statefulset_sized_from_spec() {
        let cr = validated_cluster(4);
        let sts = build_indexer_statefulset(&cr).unwrap();
        let spec = sts.spec.as_ref().unwrap();

        assert_eq!(spec.replicas, Some(4));
        assert_eq!(spec.service_name, "splunk-idx-indexer-headless");
        assert_eq!(
            spec.update_strategy.as_ref().unwrap().type_.as_deref(),
            Some("OnDelete")
        );
        let claims: Vec<String> = spec
            .volume_claim_templates
            .as_ref()
            .unwrap()
            .iter()
            .map(|c| c.name_any())
            .collect();
        assert_eq!(claims, VOLUME_CLAIM_NAMES.map(String::from).to_vec());
    }

    #[test]
    fn test_master_statefulset_is_singleton() {
        let cr = validated_cluster(7);
        let sts = build_cluster_master_statefulset(&cr).unwrap();
        assert_eq!(sts.spec.as_ref().unwrap().replicas, Some(1));

        let container = splunk_container(&sts);
        assert_eq!(env_value(container, "SPLUNK_ROLE").as_deref(), Some("splunk_cluster_master"));
        assert_eq!(env_value(container, "SPLUNK_CLUSTER_MASTER_URL").as_deref(), Some("localhost"));
    }

    #[test]
    fn test_indexers_point_at_master_service() {
        let cr = validated_cluster(3);
        let sts = build_indexer_statefulset(&cr).unwrap();
        let container = splunk_container(&sts);

        assert_eq!(
            env_value(container, "SPLUNK_CLUSTER_MASTER_URL").as_deref(),
            Some("splunk-idx-cluster-master-service")
        );
        assert_eq!(container.image.as_deref(), Some("splunk/splunk:latest"));
        assert!(env_value(container, "SPLUNK_LICENSE_URI").is_none());
    }

    #[test]
    fn test_defaults_volume_only_when_defaults_set() {
        let mut cr = validated_cluster(3);
        let sts = build_indexer_statefulset(&cr).unwrap();
        let volumes = sts.spec.as_ref().unwrap().template.spec.as_ref().unwrap().volumes.clone().unwrap();
        assert_eq!(volumes.len(), 1);

        cr.spec.common.defaults = "splunk:\n  site: site1\n".to_string();
        let sts = build_indexer_statefulset(&cr).unwrap();
        let container = splunk_container(&sts);
        let defaults_url = env_value(container, "SPLUNK_DEFAULTS_URL").unwrap();
        assert_eq!(
            defaults_url,
            "/mnt/splunk-defaults/default.yml,/mnt/splunk-secrets/default.yml"
        );
    }

    #[test]
    fn test_invalid_storage_is_a_resource_error() {
        let mut cr = validated_cluster(3);
        cr.spec.common.var_storage = "lots".to_string();

        let err = build_indexer_statefulset(&cr).unwrap_err();
        assert!(matches!(err, Error::ResourceError(_)));
    }

    #[test]
    fn test_zero_replicas_cannot_be_built() {
        let mut cr = validated_cluster(1);
        cr.spec.replicas = 0;
        assert!(build_indexer_statefulset(&cr).is_err());
    }

    #[test]
    fn test_parse_storage_quantity() {
        assert!(parse_storage_quantity("10Gi").is_ok());
        assert!(parse_storage_quantity("1.5T").is_ok());
        assert!(parse_storage_quantity("500").is_ok());
        assert!(parse_storage_quantity("").is_err());
        assert!(parse_storage_quantity("Gi").is_err());
        assert!(parse_storage_quantity("10GB").is_err());
        assert!(parse_storage_quantity("0Gi").is_err());
    }

    #[test]
    fn test_parse_storage_quantity_with_exponent() {
        assert!(parse_storage_quantity("5e9").is_ok());
        assert!(parse_storage_quantity("1E3").is_ok());
        assert!(parse_storage_quantity("2e-3").is_ok());
        assert!(parse_storage_quantity("1.5e+6").is_ok());
        assert!(parse_storage_quantity("3E").is_ok());
        assert!(parse_storage_quantity("1e").is_err());
        assert!(parse_storage_quantity("1e+").is_err());
        assert!(parse_storage_quantity("1e3Gi").is_err());
    }
}
