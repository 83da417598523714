//! REST API module for external integrations
//!
//! Provides a read-only HTTP API over IndexerClusters plus the operator's
//! health and Prometheus endpoints.

mod dto;
mod handlers;
mod server;

pub use dto::{ClusterListResponse, ClusterSummary, HealthResponse};
pub use server::{router, run_server};
