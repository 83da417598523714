//! Custom Resource Definitions for Splunk-K8s
//!
//! This module defines the Kubernetes CRDs for managing Splunk Enterprise clusters.

mod indexer_cluster;
pub mod types;

#[cfg(test)]
mod tests;

pub use indexer_cluster::{
    IndexerCluster, IndexerClusterSpec, IndexerClusterStatus, SpecValidationError,
};
pub use types::*;
