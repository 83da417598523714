//! Prometheus metrics for the Splunk operator
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports:
//! - `splunk_reconcile_duration_seconds` (histogram): reconcile duration labeled by controller.
//! - `splunk_reconcile_errors_total` (counter): reconcile errors labeled by controller and kind.
//! - `splunk_indexer_cluster_replicas` (gauge): desired indexers labeled by namespace/name.
//! - `splunk_indexer_cluster_ready_replicas` (gauge): ready indexers labeled by namespace/name.
//! - `splunk_indexer_cluster_ready` (gauge): 1 when both tiers are Ready, labeled by namespace/name/tier.

use std::sync::atomic::{AtomicI64, AtomicU64};

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::crd::IndexerClusterStatus;

/// Labels identifying one IndexerCluster
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ClusterLabels {
    pub namespace: String,
    pub name: String,
}

/// Labels identifying one tier of an IndexerCluster
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TierLabels {
    pub namespace: String,
    pub name: String,
    /// "indexer" or "cluster-master"
    pub tier: String,
}

/// Labels for operator reconcile metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    /// Controller name, e.g. "indexercluster"
    pub controller: String,
}

/// Labels for operator error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub controller: String,
    /// Error kind, e.g. "kube", "validation", "termination"
    pub kind: String,
}

/// Gauge tracking desired indexers per cluster
pub static CLUSTER_REPLICAS: Lazy<Family<ClusterLabels, Gauge<i64, AtomicI64>>> =
    Lazy::new(Family::default);

/// Gauge tracking ready indexers per cluster
pub static CLUSTER_READY_REPLICAS: Lazy<Family<ClusterLabels, Gauge<i64, AtomicI64>>> =
    Lazy::new(Family::default);

/// Gauge set to 1 while a tier reports Ready
pub static TIER_READY: Lazy<Family<TierLabels, Gauge<i64, AtomicI64>>> =
    Lazy::new(Family::default);

/// Histogram tracking reconcile duration (seconds)
pub static RECONCILE_DURATION_SECONDS: Lazy<Family<ReconcileLabels, Histogram>> = Lazy::new(|| {
    fn reconcile_histogram() -> Histogram {
        // 1ms .. ~32s across 16 buckets.
        Histogram::new(exponential_buckets(0.001, 2.0, 16))
    }

    Family::new_with_constructor(reconcile_histogram)
});

/// Counter tracking reconcile errors
pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "splunk_reconcile_duration_seconds",
        "Duration of reconcile loops in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "splunk_reconcile_errors_total",
        "Total number of reconcile errors",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "splunk_indexer_cluster_replicas",
        "Desired number of indexers",
        CLUSTER_REPLICAS.clone(),
    );
    registry.register(
        "splunk_indexer_cluster_ready_replicas",
        "Number of indexers reporting ready",
        CLUSTER_READY_REPLICAS.clone(),
    );
    registry.register(
        "splunk_indexer_cluster_ready",
        "Whether a tier of the cluster is Ready (1) or not (0)",
        TIER_READY.clone(),
    );

    registry
});

/// Observe a reconcile duration in seconds.
pub fn observe_reconcile_duration_seconds(controller: &str, seconds: f64) {
    let labels = ReconcileLabels {
        controller: controller.to_string(),
    };
    RECONCILE_DURATION_SECONDS
        .get_or_create(&labels)
        .observe(seconds);
}

/// Increment the reconcile error counter.
pub fn inc_reconcile_error(controller: &str, kind: &str) {
    let labels = ErrorLabels {
        controller: controller.to_string(),
        kind: kind.to_string(),
    };
    RECONCILE_ERRORS_TOTAL.get_or_create(&labels).inc();
}

/// Publish the gauges derived from a cluster's status
pub fn record_cluster_status(namespace: &str, name: &str, status: &IndexerClusterStatus) {
    let labels = ClusterLabels {
        namespace: namespace.to_string(),
        name: name.to_string(),
    };
    CLUSTER_REPLICAS
        .get_or_create(&labels)
        .set(i64::from(status.replicas));
    CLUSTER_READY_REPLICAS
        .get_or_create(&labels)
        .set(i64::from(status.ready_replicas));

    for (tier, phase) in [
        ("indexer", status.phase),
        ("cluster-master", status.cluster_master_phase),
    ] {
        let labels = TierLabels {
            namespace: namespace.to_string(),
            name: name.to_string(),
            tier: tier.to_string(),
        };
        TIER_READY
            .get_or_create(&labels)
            .set(i64::from(phase.is_ready()));
    }
}

/// Drop every gauge series of a cluster that has been torn down
pub fn forget_cluster(namespace: &str, name: &str) {
    let labels = ClusterLabels {
        namespace: namespace.to_string(),
        name: name.to_string(),
    };
    CLUSTER_REPLICAS.remove(&labels);
    CLUSTER_READY_REPLICAS.remove(&labels);

    for tier in ["indexer", "cluster-master"] {
        TIER_READY.remove(&TierLabels {
            namespace: namespace.to_string(),
            name: name.to_string(),
            tier: tier.to_string(),
        });
    }
}
