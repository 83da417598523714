//! Control-plane handle used by the IndexerCluster reconciler
//!
//! Every side effect of a reconcile cycle goes through [`ControllerClient`].
//! Production code uses [`KubeControllerClient`]; tests substitute a mock.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{CommonSplunkSpec, IndexerCluster, InstanceType, Phase};
use crate::error::Result;

use super::{config, finalizers, statefulset};

/// Field manager used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "splunk-operator";

/// Result of a StatefulSet create-or-update
#[derive(Clone, Debug)]
pub struct AppliedStatefulSet {
    /// Phase implied by the apply (`Pending` on create, `Updating` on change, `Ready` otherwise)
    pub phase: Phase,
    /// The object as it now exists in the cluster, including its status
    pub statefulset: StatefulSet,
}

impl AppliedStatefulSet {
    /// Ready member count observed on the live object
    pub fn ready_replicas(&self) -> i32 {
        self.statefulset
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0)
    }
}

/// Outcome of running the deletion finalizers
#[derive(Debug)]
pub struct DeletionCheck {
    /// The resource is being torn down
    pub terminating: bool,
    /// Error raised while running finalizers, if any
    pub outcome: Result<()>,
}

/// Trait abstracting every cluster operation the reconciler performs
///
/// Each method is a create-or-update (or a read) that is safe to repeat.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ControllerClient: Send + Sync {
    /// Write the IndexerCluster status subresource
    async fn update_status(&self, cluster: &IndexerCluster) -> Result<()>;

    /// Run deletion finalizers for a cluster that has a deletion timestamp
    async fn check_deletion(&self, cluster: &IndexerCluster) -> DeletionCheck;

    /// Ensure the shared Splunk configuration (secrets, defaults) for a role
    async fn reconcile_config(
        &self,
        cluster: &IndexerCluster,
        spec: &CommonSplunkSpec,
        role: InstanceType,
    ) -> Result<Secret>;

    /// Create or update a Service
    async fn apply_service(&self, service: &Service) -> Result<()>;

    /// Create or update a StatefulSet, leaving its replica count alone
    async fn apply_statefulset(&self, statefulset: &StatefulSet) -> Result<AppliedStatefulSet>;

    /// Move the StatefulSet's pods toward `desired_replicas` ready members on
    /// the current revision, one step per call
    async fn reconcile_statefulset_pods(
        &self,
        statefulset: &StatefulSet,
        ready_replicas: i32,
        desired_replicas: i32,
    ) -> Result<Phase>;
}

/// Real Kubernetes client implementation
#[derive(Clone)]
pub struct KubeControllerClient {
    client: Client,
    field_manager: String,
}

impl KubeControllerClient {
    pub fn new(client: Client) -> Self {
        Self::with_field_manager(client, FIELD_MANAGER)
    }

    pub fn with_field_manager(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ControllerClient for KubeControllerClient {
    async fn update_status(&self, cluster: &IndexerCluster) -> Result<()> {
        let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<IndexerCluster> = Api::namespaced(self.client.clone(), &namespace);

        let patch = serde_json::json!({ "status": cluster.status });
        api.patch_status(
            &cluster.name_any(),
            &PatchParams::apply(&self.field_manager),
            &Patch::Merge(&patch),
        )
        .await?;

        debug!("Updated status for IndexerCluster {}/{}", namespace, cluster.name_any());
        Ok(())
    }

    async fn check_deletion(&self, cluster: &IndexerCluster) -> DeletionCheck {
        finalizers::check_splunk_deletion(&self.client, &self.field_manager, cluster).await
    }

    async fn reconcile_config(
        &self,
        cluster: &IndexerCluster,
        spec: &CommonSplunkSpec,
        role: InstanceType,
    ) -> Result<Secret> {
        config::reconcile_splunk_config(&self.client, &self.field_manager, cluster, spec, role).await
    }

    async fn apply_service(&self, service: &Service) -> Result<()> {
        let namespace = service.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        let name = service.name_any();

        api.patch(
            &name,
            &PatchParams::apply(&self.field_manager).force(),
            &Patch::Apply(service),
        )
        .await?;

        debug!("Applied Service {}/{}", namespace, name);
        Ok(())
    }

    async fn apply_statefulset(&self, statefulset: &StatefulSet) -> Result<AppliedStatefulSet> {
        statefulset::apply_statefulset(&self.client, statefulset).await
    }

    async fn reconcile_statefulset_pods(
        &self,
        statefulset: &StatefulSet,
        ready_replicas: i32,
        desired_replicas: i32,
    ) -> Result<Phase> {
        statefulset::reconcile_statefulset_pods(
            &self.client,
            &self.field_manager,
            statefulset,
            ready_replicas,
            desired_replicas,
        )
        .await
    }
}
