//! One reconcile cycle for an IndexerCluster
//!
//! The cycle runs strictly in order: validate, reset status, handle deletion,
//! shared config, services, cluster master, indexers. The first failure ends
//! the cycle. Once validation has passed, the status is written back whichever
//! way the cycle ends, so it always describes the last step attempted.

use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use crate::crd::{IndexerCluster, IndexerClusterStatus, InstanceType, Phase};
use crate::error::{Error, Result};

use super::client::ControllerClient;
use super::resources::{build_cluster_master_statefulset, build_indexer_statefulset, build_service};

/// Converge an IndexerCluster toward its spec
///
/// Safe to call repeatedly; every step is a create-or-update.
///
/// # Errors
///
/// Returns the first error raised by validation or by any collaborator.
/// Nothing is retried here; the caller requeues.
#[instrument(skip(client, cr), fields(name = %cr.name_any(), namespace = cr.namespace()))]
pub async fn reconcile_indexer_cluster(client: &dyn ControllerClient, cr: &mut IndexerCluster) -> Result<()> {
    if let Err(errors) = cr.spec.validate() {
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        warn!("IndexerCluster {} failed validation: {}", cr.name_any(), message);
        return Err(Error::ValidationError(message));
    }

    // master rollout is gated on the indexer phase recorded by the previous cycle
    let previous_phase = cr.status.as_ref().map(|s| s.phase).unwrap_or_default();

    let replicas = cr.spec.replicas;
    let selector = cr.indexer_selector();
    let status = cr.status.get_or_insert_with(IndexerClusterStatus::default);
    status.phase = Phase::Error;
    status.cluster_master_phase = Phase::Error;
    status.replicas = replicas;
    status.selector = selector;

    let result = reconcile_tiers(client, cr, previous_phase).await;

    if let Err(e) = client.update_status(cr).await {
        warn!("Failed to update status for IndexerCluster {}: {}", cr.name_any(), e);
    }

    result
}

async fn reconcile_tiers(
    client: &dyn ControllerClient,
    cr: &mut IndexerCluster,
    previous_phase: Phase,
) -> Result<()> {
    if cr.is_being_deleted() {
        let check = client.check_deletion(cr).await;
        if check.terminating && check.outcome.is_err() {
            set_phases(cr, Phase::Terminating, Phase::Terminating);
            if let Err(e) = client.update_status(cr).await {
                warn!("Failed to report termination of {}: {}", cr.name_any(), e);
            }
        }
        return check.outcome;
    }

    client
        .reconcile_config(cr, &cr.spec.common, InstanceType::Indexer)
        .await?;

    for (instance_type, headless) in [
        (InstanceType::Indexer, true),
        (InstanceType::Indexer, false),
        (InstanceType::ClusterMaster, false),
    ] {
        client
            .apply_service(&build_service(cr, instance_type, headless))
            .await?;
    }

    reconcile_cluster_master(client, cr, previous_phase).await?;
    reconcile_indexers(client, cr).await
}

/// Apply the cluster master StatefulSet
///
/// Its pods are only rolled when `previous_phase`, the indexer phase of the
/// previous cycle, was Ready. Otherwise the applied phase is recorded as is.
async fn reconcile_cluster_master(
    client: &dyn ControllerClient,
    cr: &mut IndexerCluster,
    previous_phase: Phase,
) -> Result<()> {
    let statefulset = build_cluster_master_statefulset(cr)?;

    let master_phase = match client.apply_statefulset(&statefulset).await {
        Ok(applied) if previous_phase.is_ready() => {
            client
                .reconcile_statefulset_pods(&applied.statefulset, applied.ready_replicas(), 1)
                .await
        }
        Ok(applied) => Ok(applied.phase),
        Err(e) => Err(e),
    };

    match master_phase {
        Ok(phase) => {
            debug!("Cluster master of {} is {}", cr.name_any(), phase);
            status_mut(cr).cluster_master_phase = phase;
            Ok(())
        }
        Err(e) => {
            status_mut(cr).cluster_master_phase = Phase::Error;
            Err(e)
        }
    }
}

async fn reconcile_indexers(client: &dyn ControllerClient, cr: &mut IndexerCluster) -> Result<()> {
    let statefulset = build_indexer_statefulset(cr)?;

    let applied = match client.apply_statefulset(&statefulset).await {
        Ok(applied) => applied,
        Err(e) => {
            status_mut(cr).phase = Phase::Error;
            return Err(e);
        }
    };

    let ready_replicas = applied.ready_replicas();
    {
        let status = status_mut(cr);
        status.phase = applied.phase;
        status.ready_replicas = ready_replicas;
    }

    if applied.phase.is_ready() {
        let desired = cr.spec.replicas;
        match client
            .reconcile_statefulset_pods(&applied.statefulset, ready_replicas, desired)
            .await
        {
            Ok(phase) => status_mut(cr).phase = phase,
            Err(e) => {
                status_mut(cr).phase = Phase::Error;
                return Err(e);
            }
        }
    }

    let phase = status_mut(cr).phase;
    info!(
        "IndexerCluster {} indexers {} ({}/{} ready)",
        cr.name_any(),
        phase,
        ready_replicas,
        cr.spec.replicas
    );
    Ok(())
}

fn status_mut(cr: &mut IndexerCluster) -> &mut IndexerClusterStatus {
    cr.status.get_or_insert_with(IndexerClusterStatus::default)
}

fn set_phases(cr: &mut IndexerCluster, phase: Phase, cluster_master_phase: Phase) {
    let status = status_mut(cr);
    status.phase = phase;
    status.cluster_master_phase = cluster_master_phase;
}
