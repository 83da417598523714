//! Finalizer handling for IndexerCluster teardown
//!
//! When an IndexerCluster carries a deletion timestamp, each finalizer we
//! understand is run and then removed from the object. Once the list is
//! empty Kubernetes completes the deletion.

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams},
    Client, ResourceExt,
};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::crd::IndexerCluster;
use crate::error::{Error, Result};

use super::client::DeletionCheck;

/// Finalizer that removes every PVC belonging to the cluster before deletion
pub const DELETE_PVC_FINALIZER: &str = "enterprise.splunk.com/delete-pvc";

/// Label selector matching every PVC created for this cluster (both tiers)
pub fn cluster_pvc_selector(cluster: &IndexerCluster) -> String {
    format!(
        "app.kubernetes.io/part-of=splunk-{}-indexer",
        cluster.identifier()
    )
}

/// Finalizers left after removing `done`
pub fn remaining_finalizers(finalizers: &[String], done: &str) -> Vec<String> {
    finalizers
        .iter()
        .filter(|f| f.as_str() != done)
        .cloned()
        .collect()
}

/// Run finalizers for a cluster that is being deleted
///
/// `terminating` is set whenever a deletion timestamp is present, even if a
/// finalizer fails; the failure is carried in `outcome`.
#[instrument(skip(client, field_manager, cluster), fields(name = %cluster.name_any(), namespace = cluster.namespace()))]
pub async fn check_splunk_deletion(
    client: &Client,
    field_manager: &str,
    cluster: &IndexerCluster,
) -> DeletionCheck {
    if !cluster.is_being_deleted() {
        return DeletionCheck {
            terminating: false,
            outcome: Ok(()),
        };
    }

    info!("IndexerCluster {} is being deleted", cluster.name_any());
    DeletionCheck {
        terminating: true,
        outcome: run_finalizers(client, field_manager, cluster).await,
    }
}

async fn run_finalizers(client: &Client, field_manager: &str, cluster: &IndexerCluster) -> Result<()> {
    let mut remaining: Vec<String> = cluster.finalizers().to_vec();

    for finalizer in cluster.finalizers() {
        match finalizer.as_str() {
            DELETE_PVC_FINALIZER => delete_cluster_pvcs(client, cluster).await?,
            other => {
                return Err(Error::TerminationError(format!(
                    "unknown finalizer {other} on IndexerCluster {}",
                    cluster.name_any()
                )))
            }
        }

        remaining = remaining_finalizers(&remaining, finalizer);
        remove_finalizer(client, field_manager, cluster, &remaining).await?;
    }

    Ok(())
}

async fn delete_cluster_pvcs(client: &Client, cluster: &IndexerCluster) -> Result<()> {
    let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), &namespace);

    let selector = cluster_pvc_selector(cluster);
    let pvcs = api
        .list(&ListParams::default().labels(&selector))
        .await
        .map_err(|e| Error::TerminationError(format!("failed to list PVCs ({selector}): {e}")))?;

    for pvc in pvcs {
        let name = pvc.name_any();
        match api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => info!("Deleted PVC {}/{}", namespace, name),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                warn!("PVC {}/{} was already deleted", namespace, name)
            }
            Err(e) => {
                return Err(Error::TerminationError(format!(
                    "failed to delete PVC {namespace}/{name}: {e}"
                )))
            }
        }
    }
    Ok(())
}

async fn remove_finalizer(
    client: &Client,
    field_manager: &str,
    cluster: &IndexerCluster,
    remaining: &[String],
) -> Result<()> {
    let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<IndexerCluster> = Api::namespaced(client.clone(), &namespace);

    let patch = json!({
        "metadata": {
            "finalizers": remaining
        }
    });

    api.patch(
        &cluster.name_any(),
        &PatchParams::apply(field_manager),
        &Patch::Merge(&patch),
    )
    .await
    .map_err(|e| Error::TerminationError(format!("failed to remove finalizer: {e}")))?;

    info!(
        "Removed finalizer from IndexerCluster {}, {} left",
        cluster.name_any(),
        remaining.len()
    );
    Ok(())
}
