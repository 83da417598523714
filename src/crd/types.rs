//! Shared types for the Splunk CRDs
//!
//! These sub-specs are common to every Splunk Enterprise resource kind and are
//! handed as-is to the configuration and descriptor builders.

use k8s_openapi::api::core::v1::{Affinity, Toleration};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default container image when the spec does not name one
pub const DEFAULT_SPLUNK_IMAGE: &str = "splunk/splunk:latest";

/// Default scheduler for Splunk pods
pub const DEFAULT_SCHEDULER_NAME: &str = "default-scheduler";

/// Convergence state of one tier of the cluster
///
/// The reconciler only ever asks whether a phase is `Ready`; every other value
/// is reported as-is from the StatefulSet collaborators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Phase {
    /// Resources are being created and no member is ready yet
    #[default]
    Pending,
    /// All members are ready and running the desired revision
    Ready,
    /// Pods are being recycled onto a new revision
    Updating,
    /// Members are being added
    ScalingUp,
    /// Members are being removed
    ScalingDown,
    /// The resource is being deleted
    Terminating,
    /// The last reconcile cycle failed
    Error,
}

impl Phase {
    pub fn is_ready(&self) -> bool {
        *self == Phase::Ready
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Pending => write!(f, "Pending"),
            Phase::Ready => write!(f, "Ready"),
            Phase::Updating => write!(f, "Updating"),
            Phase::ScalingUp => write!(f, "ScalingUp"),
            Phase::ScalingDown => write!(f, "ScalingDown"),
            Phase::Terminating => write!(f, "Terminating"),
            Phase::Error => write!(f, "Error"),
        }
    }
}

/// Role a Splunk instance plays inside the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum InstanceType {
    /// Scalable indexer fleet (the worker tier)
    Indexer,
    /// Singleton coordinator of the indexer fleet (the master tier)
    ClusterMaster,
}

impl InstanceType {
    /// Component name used in resource names and labels
    pub fn component(&self) -> &'static str {
        match self {
            InstanceType::Indexer => "indexer",
            InstanceType::ClusterMaster => "cluster-master",
        }
    }

    /// Value of the `SPLUNK_ROLE` environment variable
    pub fn splunk_role(&self) -> &'static str {
        match self {
            InstanceType::Indexer => "splunk_indexer",
            InstanceType::ClusterMaster => "splunk_cluster_master",
        }
    }
}

impl std::fmt::Display for InstanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.component())
    }
}

/// Compute resource requests and limits for a Splunk container
///
/// Empty fields are filled in by spec validation.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: ResourceSpec,
    #[serde(default)]
    pub limits: ResourceSpec,
}

/// CPU and memory quantities (e.g. "500m", "8Gi")
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct ResourceSpec {
    #[serde(default)]
    pub cpu: String,
    #[serde(default)]
    pub memory: String,
}

/// Kubernetes-level settings shared by all Splunk resource kinds
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommonSpec {
    /// Container image to run (defaults to `splunk/splunk:latest`)
    #[serde(default)]
    pub image: String,

    /// `Always` or `IfNotPresent` (defaults to `IfNotPresent`)
    #[serde(default)]
    pub image_pull_policy: String,

    /// Scheduler used for the pods (defaults to `default-scheduler`)
    #[serde(default)]
    pub scheduler_name: String,

    #[serde(default)]
    pub resources: ResourceRequirements,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub affinity: Option<Affinity>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(with = "Vec<serde_json::Value>")]
    pub tolerations: Vec<Toleration>,
}

/// Splunk-specific settings shared by all Splunk resource kinds
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommonSplunkSpec {
    #[serde(flatten)]
    pub spec: CommonSpec,

    /// Size of the `/opt/splunk/etc` volume (defaults to 10Gi)
    #[serde(default)]
    pub etc_storage: String,

    /// Size of the `/opt/splunk/var` volume (defaults to 100Gi)
    #[serde(default)]
    pub var_storage: String,

    /// Inline `default.yml` passed to splunk-ansible
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub defaults: String,

    /// Comma-separated list of extra `default.yml` locations
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub defaults_url: String,

    /// Location of the Splunk license file
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub license_url: String,
}
