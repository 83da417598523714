//! Main reconciler for IndexerCluster resources
//!
//! Implements the controller pattern using kube-rs runtime. Each event runs
//! one [`reconcile_indexer_cluster`] cycle against a private copy of the
//! object; the status written back is the only mutation that reaches the API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::{
    api::Api,
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    ResourceExt,
};
use tracing::{debug, error, info, instrument, warn};

use crate::crd::IndexerCluster;
use crate::error::{Error, Result};

use super::client::KubeControllerClient;
use super::indexer::reconcile_indexer_cluster;

const CONTROLLER_NAME: &str = "indexercluster";

/// Requeue interval once both tiers are Ready
const STEADY_REQUEUE: Duration = Duration::from_secs(60);
/// Requeue interval while the cluster is still converging
const CONVERGING_REQUEUE: Duration = Duration::from_secs(15);
/// Requeue interval for replicas that do not hold the leader lease
const STANDBY_REQUEUE: Duration = Duration::from_secs(5);

/// Shared state for the controller
pub struct ControllerState {
    pub client: KubeControllerClient,
    /// Namespace to watch; all namespaces when unset
    pub watch_namespace: Option<String>,
    /// Set by the leader election task; only the leader reconciles
    pub is_leader: Arc<AtomicBool>,
}

impl ControllerState {
    pub fn new(client: Client, field_manager: &str, watch_namespace: Option<String>, is_leader: Arc<AtomicBool>) -> Self {
        Self {
            client: KubeControllerClient::with_field_manager(client, field_manager),
            watch_namespace,
            is_leader,
        }
    }

    /// Api handle scoped to the watched namespace
    pub fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + serde::de::DeserializeOwned
            + std::fmt::Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        let client = self.client.client().clone();
        match &self.watch_namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let clusters: Api<IndexerCluster> = state.api();

    info!("Starting IndexerCluster controller");

    // Verify CRD exists
    match clusters.list(&Default::default()).await {
        Ok(_) => info!("IndexerCluster CRD is available"),
        Err(e) => {
            error!(
                "IndexerCluster CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError(
                "IndexerCluster CRD not installed".to_string(),
            ));
        }
    }

    Controller::new(clusters, Config::default())
        // Watch owned resources for changes
        .owns::<StatefulSet>(state.api(), Config::default())
        .owns::<Service>(state.api(), Config::default())
        .owns::<Secret>(state.api(), Config::default())
        .owns::<ConfigMap>(state.api(), Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => warn!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// The main reconciliation function
///
/// This function is called whenever:
/// - An IndexerCluster is created, updated, or deleted
/// - An owned resource (StatefulSet, Service, Secret, ConfigMap) changes
/// - The requeue timer expires
#[instrument(skip(obj, ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<IndexerCluster>, ctx: Arc<ControllerState>) -> Result<Action> {
    if !ctx.is_leader.load(Ordering::Relaxed) {
        debug!("Not the leader, skipping reconcile of {}", obj.name_any());
        return Ok(Action::requeue(STANDBY_REQUEUE));
    }

    info!(
        "Reconciling IndexerCluster {}/{}",
        obj.namespace().unwrap_or_default(),
        obj.name_any()
    );

    let started = std::time::Instant::now();
    let mut cluster = (*obj).clone();
    let result = reconcile_indexer_cluster(&ctx.client, &mut cluster).await;

    #[cfg(feature = "metrics")]
    {
        super::metrics::observe_reconcile_duration_seconds(
            CONTROLLER_NAME,
            started.elapsed().as_secs_f64(),
        );
        if cluster.is_being_deleted() && result.is_ok() {
            super::metrics::forget_cluster(
                &cluster.namespace().unwrap_or_default(),
                &cluster.name_any(),
            );
        } else if let Some(status) = cluster.status.as_ref() {
            super::metrics::record_cluster_status(
                &cluster.namespace().unwrap_or_default(),
                &cluster.name_any(),
                status,
            );
        }
    }
    #[cfg(not(feature = "metrics"))]
    let _ = started;

    result?;
    Ok(Action::requeue(requeue_after(&cluster)))
}

/// Requeue sooner while either tier is still converging
pub fn requeue_after(cluster: &IndexerCluster) -> Duration {
    let converged = cluster
        .status
        .as_ref()
        .map(|s| s.phase.is_ready() && s.cluster_master_phase.is_ready())
        .unwrap_or(false);

    if converged {
        STEADY_REQUEUE
    } else {
        CONVERGING_REQUEUE
    }
}

/// Error policy determines how to handle reconciliation errors
fn error_policy(cluster: Arc<IndexerCluster>, error: &Error, _ctx: Arc<ControllerState>) -> Action {
    error!("Reconciliation error for {}: {:?}", cluster.name_any(), error);

    #[cfg(feature = "metrics")]
    super::metrics::inc_reconcile_error(CONTROLLER_NAME, error.kind());

    Action::requeue(retry_after(error))
}

/// Use shorter retry for retriable errors
pub fn retry_after(error: &Error) -> Duration {
    if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{IndexerClusterSpec, IndexerClusterStatus, Phase};

    fn cluster_with_phases(phase: Phase, master: Phase) -> IndexerCluster {
        let mut cluster = IndexerCluster::new("idx", IndexerClusterSpec::default());
        cluster.status = Some(IndexerClusterStatus {
            phase,
            cluster_master_phase: master,
            ..Default::default()
        });
        cluster
    }

    #[test]
    fn test_requeue_slows_down_once_converged() {
        assert_eq!(
            requeue_after(&cluster_with_phases(Phase::Ready, Phase::Ready)),
            STEADY_REQUEUE
        );
        assert_eq!(
            requeue_after(&cluster_with_phases(Phase::Ready, Phase::Updating)),
            CONVERGING_REQUEUE
        );
        assert_eq!(
            requeue_after(&IndexerCluster::new("idx", IndexerClusterSpec::default())),
            CONVERGING_REQUEUE
        );
    }

    #[test]
    fn test_retry_after_depends_on_error_kind() {
        assert_eq!(
            retry_after(&Error::TerminationError("pvc".to_string())),
            Duration::from_secs(15)
        );
        assert_eq!(
            retry_after(&Error::ValidationError("replicas".to_string())),
            Duration::from_secs(60)
        );
    }
}
