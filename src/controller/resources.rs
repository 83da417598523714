//! Kubernetes resource builders for IndexerCluster
//!
//! This module turns an IndexerCluster into the immutable descriptors
//! (Services, StatefulSets) that the apply collaborators push to the cluster.
//! Nothing here talks to the API server.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EnvVar, ExecAction, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements as K8sResources, SecretVolumeSource, Service, ServicePort, ServiceSpec,
    Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use crate::crd::{IndexerCluster, InstanceType, ResourceSpec};
use crate::error::{Error, Result};

pub const MANAGED_BY: &str = "splunk-operator";

const SPLUNK_HOME: &str = "/opt/splunk";
const SECRETS_MOUNT_PATH: &str = "/mnt/splunk-secrets";
const DEFAULTS_MOUNT_PATH: &str = "/mnt/splunk-defaults";

/// Persistent volume claim templates, mounted at `/opt/splunk/<suffix>`
pub const VOLUME_CLAIM_NAMES: [&str; 2] = ["pvc-etc", "pvc-var"];

/// Get the standard labels for one tier of an IndexerCluster
pub fn standard_labels(cr: &IndexerCluster, instance_type: InstanceType) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/name".to_string(),
        instance_type.component().to_string(),
    );
    labels.insert(
        "app.kubernetes.io/instance".to_string(),
        resource_prefix(cr, instance_type),
    );
    labels.insert(
        "app.kubernetes.io/part-of".to_string(),
        resource_prefix(cr, InstanceType::Indexer),
    );
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        InstanceType::Indexer.component().to_string(),
    );
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        MANAGED_BY.to_string(),
    );
    labels
}

/// Create an OwnerReference for garbage collection
pub fn owner_reference(cr: &IndexerCluster) -> OwnerReference {
    OwnerReference {
        api_version: IndexerCluster::api_version(&()).to_string(),
        kind: IndexerCluster::kind(&()).to_string(),
        name: cr.name_any(),
        uid: cr.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

fn resource_prefix(cr: &IndexerCluster, instance_type: InstanceType) -> String {
    format!("splunk-{}-{}", cr.identifier(), instance_type.component())
}

/// Name of the StatefulSet for one tier
pub fn statefulset_name(cr: &IndexerCluster, instance_type: InstanceType) -> String {
    resource_prefix(cr, instance_type)
}

/// Name of a Service for one tier
pub fn service_name(cr: &IndexerCluster, instance_type: InstanceType, headless: bool) -> String {
    let suffix = if headless { "headless" } else { "service" };
    format!("{}-{}", resource_prefix(cr, instance_type), suffix)
}

/// Name of the Secret holding generated Splunk credentials
pub fn secret_name(cr: &IndexerCluster) -> String {
    format!("splunk-{}-secrets", cr.identifier())
}

/// Name of the ConfigMap carrying the inline `default.yml`
pub fn defaults_config_map_name(cr: &IndexerCluster, instance_type: InstanceType) -> String {
    format!("{}-defaults", resource_prefix(cr, instance_type))
}

fn object_meta(cr: &IndexerCluster, name: String, instance_type: InstanceType) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: cr.namespace(),
        labels: Some(standard_labels(cr, instance_type)),
        owner_references: Some(vec![owner_reference(cr)]),
        ..Default::default()
    }
}

// ============================================================================
// Service
// ============================================================================

fn splunk_ports(instance_type: InstanceType) -> Vec<(&'static str, i32)> {
    match instance_type {
        InstanceType::Indexer => vec![
            ("splunkweb", 8000),
            ("splunkd", 8089),
            ("hec", 8088),
            ("s2s", 9997),
            ("replication", 9887),
        ],
        InstanceType::ClusterMaster => vec![("splunkweb", 8000), ("splunkd", 8089)],
    }
}

/// Build a Service for one tier
///
/// A headless service gives each StatefulSet member a stable DNS name and
/// publishes addresses before pods are ready so peers can find each other
/// during bootstrap.
pub fn build_service(cr: &IndexerCluster, instance_type: InstanceType, headless: bool) -> Service {
    let labels = standard_labels(cr, instance_type);
    let ports = splunk_ports(instance_type)
        .into_iter()
        .map(|(name, port)| ServicePort {
            name: Some(name.to_string()),
            port,
            target_port: Some(IntOrString::Int(port)),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        })
        .collect();

    let mut spec = ServiceSpec {
        selector: Some(labels),
        ports: Some(ports),
        ..Default::default()
    };
    if headless {
        spec.cluster_ip = Some("None".to_string());
        spec.publish_not_ready_addresses = Some(true);
    }

    Service {
        metadata: object_meta(cr, service_name(cr, instance_type, headless), instance_type),
        spec: Some(spec),
        status: None,
    }
}

// ============================================================================
// StatefulSet
// ============================================================================

/// Build the StatefulSet for the cluster master (always exactly one member)
pub fn build_cluster_master_statefulset(cr: &IndexerCluster) -> Result<StatefulSet> {
    build_statefulset(cr, InstanceType::ClusterMaster, 1)
}

/// Build the StatefulSet for the indexers, sized to `spec.replicas`
pub fn build_indexer_statefulset(cr: &IndexerCluster) -> Result<StatefulSet> {
    build_statefulset(cr, InstanceType::Indexer, cr.spec.replicas)
}

fn build_statefulset(
    cr: &IndexerCluster,
    instance_type: InstanceType,
    replicas: i32,
) -> Result<StatefulSet> {
    if replicas < 1 {
        return Err(Error::ResourceError(format!(
            "{} replicas must be at least 1, got {}",
            instance_type, replicas
        )));
    }

    let labels = standard_labels(cr, instance_type);
    let common = &cr.spec.common;
    let volume_claims = vec![
        build_volume_claim(cr, instance_type, VOLUME_CLAIM_NAMES[0], &common.etc_storage)?,
        build_volume_claim(cr, instance_type, VOLUME_CLAIM_NAMES[1], &common.var_storage)?,
    ];

    let governing_service = match instance_type {
        InstanceType::Indexer => service_name(cr, instance_type, true),
        InstanceType::ClusterMaster => service_name(cr, instance_type, false),
    };

    Ok(StatefulSet {
        metadata: object_meta(cr, statefulset_name(cr, instance_type), instance_type),
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            service_name: governing_service,
            // Pods are recycled one at a time by the rollout reconciler
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("OnDelete".to_string()),
                ..Default::default()
            }),
            pod_management_policy: Some("Parallel".to_string()),
            template: build_pod_template(cr, instance_type, &labels),
            volume_claim_templates: Some(volume_claims),
            ..Default::default()
        }),
        status: None,
    })
}

fn build_volume_claim(
    cr: &IndexerCluster,
    instance_type: InstanceType,
    name: &str,
    size: &str,
) -> Result<PersistentVolumeClaim> {
    let mut requests = BTreeMap::new();
    requests.insert("storage".to_string(), parse_storage_quantity(size)?);

    Ok(PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(standard_labels(cr, instance_type)),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    })
}

/// Parse a storage size such as `10Gi`, `500M` or `5e9`
///
/// Accepts plain numbers with a binary or decimal suffix or a decimal
/// exponent. Anything else means the StatefulSet cannot be sized.
pub fn parse_storage_quantity(size: &str) -> Result<Quantity> {
    const SUFFIXES: [&str; 12] = [
        "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "k", "M", "G", "T", "P", "E",
    ];

    let digits_end = size
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(size.len());
    let (number, suffix) = size.split_at(digits_end);

    let valid_number = !number.is_empty()
        && number.matches('.').count() <= 1
        && !number.starts_with('.')
        && !number.ends_with('.')
        && number.parse::<f64>().map(|n| n > 0.0).unwrap_or(false);
    let valid_suffix =
        suffix.is_empty() || SUFFIXES.contains(&suffix) || is_decimal_exponent(suffix);

    if valid_number && valid_suffix {
        Ok(Quantity(size.to_string()))
    } else {
        Err(Error::ResourceError(format!(
            "invalid storage size \"{size}\""
        )))
    }
}

/// `e3`, `E+6` or `e-2`; a bare `E` is the exa suffix instead
fn is_decimal_exponent(suffix: &str) -> bool {
    let Some(exponent) = suffix.strip_prefix(['e', 'E']) else {
        return false;
    };
    let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn build_pod_template(
    cr: &IndexerCluster,
    instance_type: InstanceType,
    labels: &BTreeMap<String, String>,
) -> PodTemplateSpec {
    let common = &cr.spec.common;

    let mut volumes = vec![Volume {
        name: "mnt-splunk-secrets".to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name(cr)),
            default_mode: Some(0o644),
            ..Default::default()
        }),
        ..Default::default()
    }];
    if !common.defaults.is_empty() {
        volumes.push(Volume {
            name: "mnt-splunk-defaults".to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(defaults_config_map_name(cr, InstanceType::Indexer)),
                default_mode: Some(0o644),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    let tolerations = if common.spec.tolerations.is_empty() {
        None
    } else {
        Some(common.spec.tolerations.clone())
    };

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.clone()),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![build_container(cr, instance_type)],
            volumes: Some(volumes),
            scheduler_name: Some(common.spec.scheduler_name.clone()),
            affinity: common.spec.affinity.clone(),
            tolerations,
            ..Default::default()
        }),
    }
}

fn build_container(cr: &IndexerCluster, instance_type: InstanceType) -> Container {
    let common = &cr.spec.common;

    let ports = splunk_ports(instance_type)
        .into_iter()
        .map(|(name, port)| ContainerPort {
            name: Some(name.to_string()),
            container_port: port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        })
        .collect();

    let mut volume_mounts = vec![
        VolumeMount {
            name: VOLUME_CLAIM_NAMES[0].to_string(),
            mount_path: format!("{SPLUNK_HOME}/etc"),
            ..Default::default()
        },
        VolumeMount {
            name: VOLUME_CLAIM_NAMES[1].to_string(),
            mount_path: format!("{SPLUNK_HOME}/var"),
            ..Default::default()
        },
        VolumeMount {
            name: "mnt-splunk-secrets".to_string(),
            mount_path: SECRETS_MOUNT_PATH.to_string(),
            ..Default::default()
        },
    ];
    if !common.defaults.is_empty() {
        volume_mounts.push(VolumeMount {
            name: "mnt-splunk-defaults".to_string(),
            mount_path: DEFAULTS_MOUNT_PATH.to_string(),
            ..Default::default()
        });
    }

    Container {
        name: "splunk".to_string(),
        image: Some(common.spec.image.clone()),
        image_pull_policy: Some(common.spec.image_pull_policy.clone()),
        ports: Some(ports),
        env: Some(build_env(cr, instance_type)),
        resources: Some(K8sResources {
            requests: resource_quantities(&common.spec.resources.requests),
            limits: resource_quantities(&common.spec.resources.limits),
            ..Default::default()
        }),
        volume_mounts: Some(volume_mounts),
        readiness_probe: Some(exec_probe(
            &["/bin/grep", "started", "/opt/container_artifact/splunk-container.state"],
            10,
            5,
        )),
        liveness_probe: Some(exec_probe(&["/sbin/checkstate.sh"], 300, 30)),
        ..Default::default()
    }
}

fn build_env(cr: &IndexerCluster, instance_type: InstanceType) -> Vec<EnvVar> {
    let common = &cr.spec.common;

    let mut defaults_urls: Vec<String> = common
        .defaults_url
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(String::from)
        .collect();
    if !common.defaults.is_empty() {
        defaults_urls.push(format!("{DEFAULTS_MOUNT_PATH}/default.yml"));
    }
    defaults_urls.push(format!("{SECRETS_MOUNT_PATH}/default.yml"));

    let cluster_master_url = match instance_type {
        InstanceType::ClusterMaster => "localhost".to_string(),
        InstanceType::Indexer => service_name(cr, InstanceType::ClusterMaster, false),
    };

    let mut env = vec![
        env_var("SPLUNK_HOME", SPLUNK_HOME),
        env_var("SPLUNK_START_ARGS", "--accept-license"),
        env_var("SPLUNK_ROLE", instance_type.splunk_role()),
        env_var("SPLUNK_CLUSTER_MASTER_URL", &cluster_master_url),
        env_var("SPLUNK_DEFAULTS_URL", &defaults_urls.join(",")),
        env_var("SPLUNK_DECLARATIVE_ADMIN_PASSWORD", "true"),
    ];
    if !common.license_url.is_empty() {
        env.push(env_var("SPLUNK_LICENSE_URI", &common.license_url));
    }
    env
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn exec_probe(command: &[&str], initial_delay_seconds: i32, period_seconds: i32) -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(command.iter().map(|c| c.to_string()).collect()),
        }),
        initial_delay_seconds: Some(initial_delay_seconds),
        period_seconds: Some(period_seconds),
        timeout_seconds: Some(30),
        ..Default::default()
    }
}

fn resource_quantities(spec: &ResourceSpec) -> Option<BTreeMap<String, Quantity>> {
    let mut quantities = BTreeMap::new();
    if !spec.cpu.is_empty() {
        quantities.insert("cpu".to_string(), Quantity(spec.cpu.clone()));
    }
    if !spec.memory.is_empty() {
        quantities.insert("memory".to_string(), Quantity(spec.memory.clone()));
    }
    if quantities.is_empty() {
        None
    } else {
        Some(quantities)
    }
}
