//! Splunk-K8s: Kubernetes Operator for Splunk Enterprise indexer clusters
//!
//! This crate provides the `IndexerCluster` custom resource and the
//! controller that converges a cluster master and a fleet of indexers
//! toward it.

pub mod controller;
pub mod crd;
pub mod error;
pub mod telemetry;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};
