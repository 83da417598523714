//! Response bodies for the REST API

use serde::{Deserialize, Serialize};

use crate::crd::{IndexerCluster, IndexerClusterStatus, Phase};
use kube::ResourceExt;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Whether this replica currently holds the leader lease
    pub leader: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub name: String,
    pub namespace: String,
    pub phase: Phase,
    pub cluster_master_phase: Phase,
    pub replicas: i32,
    pub ready_replicas: i32,
}

impl From<&IndexerCluster> for ClusterSummary {
    fn from(cluster: &IndexerCluster) -> Self {
        let status = cluster.status.clone().unwrap_or_default();
        Self {
            name: cluster.name_any(),
            namespace: cluster.namespace().unwrap_or_default(),
            phase: status.phase,
            cluster_master_phase: status.cluster_master_phase,
            replicas: cluster.spec.replicas,
            ready_replicas: status.ready_replicas,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClusterListResponse {
    pub items: Vec<ClusterSummary>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDetailResponse {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub replicas: i32,
    pub status: IndexerClusterStatus,
    pub created_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::IndexerClusterSpec;

    #[test]
    fn test_summary_without_status_reports_pending() {
        let cluster = IndexerCluster::new(
            "idx",
            IndexerClusterSpec {
                replicas: 3,
                ..Default::default()
            },
        );
        let summary = ClusterSummary::from(&cluster);

        assert_eq!(summary.phase, Phase::Pending);
        assert_eq!(summary.replicas, 3);
        assert_eq!(summary.ready_replicas, 0);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["clusterMasterPhase"], "Pending");
    }
}
