//! IndexerCluster Custom Resource Definition
//!
//! An IndexerCluster describes a Splunk Enterprise indexer cluster: one
//! cluster master coordinating a scalable fleet of indexers.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    CommonSplunkSpec, Phase, ResourceSpec, DEFAULT_SCHEDULER_NAME, DEFAULT_SPLUNK_IMAGE,
};

const DEFAULT_ETC_STORAGE: &str = "10Gi";
const DEFAULT_VAR_STORAGE: &str = "100Gi";

/// Structured validation error for `IndexerClusterSpec`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecValidationError {
    pub field: String,
    pub message: String,
    pub how_to_fix: String,
}

impl SpecValidationError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        how_to_fix: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            how_to_fix: how_to_fix.into(),
        }
    }
}

impl std::fmt::Display for SpecValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.field, self.message, self.how_to_fix)
    }
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "enterprise.splunk.com",
    version = "v1alpha2",
    kind = "IndexerCluster",
    namespaced,
    status = "IndexerClusterStatus",
    shortname = "idxc",
    scale = r#"{"specReplicasPath":".spec.replicas","statusReplicasPath":".status.replicas","labelSelectorPath":".status.selector"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Master","type":"string","jsonPath":".status.clusterMasterPhase"}"#,
    printcolumn = r#"{"name":"Desired","type":"integer","jsonPath":".status.replicas"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IndexerClusterSpec {
    #[serde(flatten)]
    pub common: CommonSplunkSpec,

    /// Number of indexers (0 is normalized to 1)
    #[serde(default)]
    pub replicas: i32,
}

impl IndexerClusterSpec {
    /// Validate the spec and fill in defaults in place
    ///
    /// Normalization is idempotent, so running it on an already-validated spec
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns every problem found, not just the first one.
    pub fn validate(&mut self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors: Vec<SpecValidationError> = Vec::new();

        if self.replicas < 0 {
            errors.push(SpecValidationError::new(
                "spec.replicas",
                format!("replicas must not be negative, got {}", self.replicas),
                "Set spec.replicas to 1 or greater.",
            ));
        } else if self.replicas == 0 {
            self.replicas = 1;
        }

        let spec = &mut self.common.spec;
        if spec.image.is_empty() {
            spec.image = DEFAULT_SPLUNK_IMAGE.to_string();
        }

        match spec.image_pull_policy.as_str() {
            "" => spec.image_pull_policy = "IfNotPresent".to_string(),
            "Always" | "IfNotPresent" => {}
            other => errors.push(SpecValidationError::new(
                "spec.imagePullPolicy",
                format!("imagePullPolicy must be one of \"Always\" or \"IfNotPresent\"; value=\"{other}\""),
                "Set spec.imagePullPolicy to Always or IfNotPresent, or leave it empty.",
            )),
        }

        if spec.scheduler_name.is_empty() {
            spec.scheduler_name = DEFAULT_SCHEDULER_NAME.to_string();
        }

        default_resource_spec(&mut spec.resources.requests, "100m", "512Mi");
        default_resource_spec(&mut spec.resources.limits, "4", "8Gi");

        if self.common.etc_storage.is_empty() {
            self.common.etc_storage = DEFAULT_ETC_STORAGE.to_string();
        }
        if self.common.var_storage.is_empty() {
            self.common.var_storage = DEFAULT_VAR_STORAGE.to_string();
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn default_resource_spec(spec: &mut ResourceSpec, cpu: &str, memory: &str) {
    if spec.cpu.is_empty() {
        spec.cpu = cpu.to_string();
    }
    if spec.memory.is_empty() {
        spec.memory = memory.to_string();
    }
}

/// Status subresource for IndexerCluster
///
/// Rewritten on every reconcile cycle. `phase` tracks the indexer fleet,
/// `cluster_master_phase` the coordinator.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IndexerClusterStatus {
    /// Overall state of the indexer tier
    #[serde(default)]
    pub phase: Phase,

    /// State of the cluster master
    #[serde(default)]
    pub cluster_master_phase: Phase,

    /// Desired number of indexers, mirrored from the spec
    #[serde(default)]
    pub replicas: i32,

    /// Number of indexers reporting ready
    #[serde(default)]
    pub ready_replicas: i32,

    /// Label selector matching the indexer pods (used by the scale subresource)
    #[serde(default)]
    pub selector: String,
}

impl IndexerCluster {
    /// Stable identifier used to derive resource names
    pub fn identifier(&self) -> String {
        self.name_any()
    }

    /// Label selector string for the indexer pods of this cluster
    pub fn indexer_selector(&self) -> String {
        format!(
            "app.kubernetes.io/instance=splunk-{}-indexer",
            self.identifier()
        )
    }

    /// Whether the control plane has requested deletion
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_replicas_defaults_to_one() {
        let mut spec = IndexerClusterSpec::default();
        spec.validate().unwrap();

        assert_eq!(spec.replicas, 1);
        assert_eq!(spec.common.spec.image, DEFAULT_SPLUNK_IMAGE);
        assert_eq!(spec.common.spec.image_pull_policy, "IfNotPresent");
        assert_eq!(spec.common.spec.scheduler_name, DEFAULT_SCHEDULER_NAME);
        assert_eq!(spec.common.etc_storage, "10Gi");
        assert_eq!(spec.common.var_storage, "100Gi");
        assert_eq!(spec.common.spec.resources.limits.memory, "8Gi");
    }

    #[test]
    fn test_negative_replicas_rejected() {
        let mut spec = IndexerClusterSpec {
            replicas: -2,
            ..Default::default()
        };
        let errors = spec.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "spec.replicas");
    }

    #[test]
    fn test_bad_pull_policy_rejected() {
        let mut spec = IndexerClusterSpec {
            replicas: 3,
            ..Default::default()
        };
        spec.common.spec.image_pull_policy = "Never".to_string();

        let errors = spec.validate().unwrap_err();
        assert_eq!(errors[0].field, "spec.imagePullPolicy");
        assert!(errors[0].message.contains("Never"));
    }

    #[test]
    fn test_validate_is_idempotent() {
        let mut spec = IndexerClusterSpec {
            replicas: 5,
            ..Default::default()
        };
        spec.common.spec.image = "splunk/splunk:9.1".to_string();
        spec.validate().unwrap();
        let first = serde_json::to_value(&spec).unwrap();
        spec.validate().unwrap();

        assert_eq!(first, serde_json::to_value(&spec).unwrap());
        assert_eq!(spec.replicas, 5);
        assert_eq!(spec.common.spec.image, "splunk/splunk:9.1");
    }

    #[test]
    fn test_selector_derived_from_name() {
        let cluster = IndexerCluster::new("idx", IndexerClusterSpec::default());
        assert_eq!(
            cluster.indexer_selector(),
            "app.kubernetes.io/instance=splunk-idx-indexer"
        );
        assert!(!cluster.is_being_deleted());
    }
}
