//! Controller module for IndexerCluster reconciliation
//! This module contains the controller loop, the per-cycle reconcile logic,
//! and the collaborators that manage the cluster's Kubernetes resources.

mod client;
mod config;
mod finalizers;
mod indexer;
#[cfg(feature = "metrics")]
pub mod metrics;
mod reconciler;
pub mod resources;
#[cfg(test)]
mod resources_test;
pub mod statefulset;

pub use client::{
    AppliedStatefulSet, ControllerClient, DeletionCheck, KubeControllerClient, FIELD_MANAGER,
};
pub use config::{fill_missing_secrets, SECRET_KEYS};
pub use finalizers::DELETE_PVC_FINALIZER;
pub use indexer::reconcile_indexer_cluster;
pub use reconciler::{requeue_after, retry_after, run_controller, ControllerState};
pub use statefulset::{plan_pod_rollout, RolloutStep};
