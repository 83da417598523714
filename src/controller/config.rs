//! Shared Splunk configuration for an IndexerCluster
//!
//! Every member of the cluster mounts the same Secret. It carries the admin
//! password, HEC token and clustering keys, plus a `default.yml` that
//! splunk-ansible reads at startup. An optional defaults ConfigMap carries the
//! user's inline `default.yml`.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::crd::{CommonSplunkSpec, IndexerCluster, InstanceType};
use crate::error::{Error, Result};

use super::resources::{defaults_config_map_name, owner_reference, secret_name, standard_labels};

/// Secret keys generated for every cluster
pub const SECRET_KEYS: [&str; 5] = [
    "hec_token",
    "password",
    "pass4SymmKey",
    "idxc_secret",
    "shc_secret",
];

/// Key under which the rendered splunk-ansible defaults are stored
pub const DEFAULTS_KEY: &str = "default.yml";

const SECRET_LENGTH: usize = 24;

/// Ensure the defaults ConfigMap and the shared Secret for a role
#[instrument(skip(client, field_manager, cluster, spec), fields(name = %cluster.name_any(), namespace = cluster.namespace(), role = %role))]
pub async fn reconcile_splunk_config(
    client: &Client,
    field_manager: &str,
    cluster: &IndexerCluster,
    spec: &CommonSplunkSpec,
    role: InstanceType,
) -> Result<Secret> {
    let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());

    if !spec.defaults.is_empty() {
        let api: Api<ConfigMap> = Api::namespaced(client.clone(), &namespace);
        let config_map = build_defaults_config_map(cluster, spec, role);
        api.patch(
            &config_map.name_any(),
            &PatchParams::apply(field_manager).force(),
            &Patch::Apply(&config_map),
        )
        .await?;
        debug!("Applied defaults ConfigMap {}/{}", namespace, config_map.name_any());
    }

    let api: Api<Secret> = Api::namespaced(client.clone(), &namespace);
    let name = secret_name(cluster);

    match api.get_opt(&name).await? {
        Some(mut existing) => {
            let current = existing.data.clone().unwrap_or_default();
            let (data, changed) = fill_missing_secrets(&current)?;
            if !changed {
                return Ok(existing);
            }

            info!("Adding missing keys to Secret {}/{}", namespace, name);
            existing.data = Some(data);
            Ok(api.replace(&name, &PostParams::default(), &existing).await?)
        }
        None => {
            let (data, _) = fill_missing_secrets(&BTreeMap::new())?;
            let secret = Secret {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    namespace: Some(namespace.clone()),
                    labels: Some(standard_labels(cluster, role)),
                    owner_references: Some(vec![owner_reference(cluster)]),
                    ..Default::default()
                },
                data: Some(data),
                type_: Some("Opaque".to_string()),
                ..Default::default()
            };

            info!("Creating Secret {}/{}", namespace, name);
            Ok(api.create(&PostParams::default(), &secret).await?)
        }
    }
}

/// Build the ConfigMap holding the user-supplied `default.yml`
pub fn build_defaults_config_map(
    cluster: &IndexerCluster,
    spec: &CommonSplunkSpec,
    role: InstanceType,
) -> ConfigMap {
    let mut data = BTreeMap::new();
    data.insert(DEFAULTS_KEY.to_string(), spec.defaults.clone());

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(defaults_config_map_name(cluster, role)),
            namespace: cluster.namespace(),
            labels: Some(standard_labels(cluster, role)),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Generate every missing secret value and re-render `default.yml`
///
/// Values already present are kept as-is. Returns the full data map and
/// whether anything was added.
pub fn fill_missing_secrets(
    existing: &BTreeMap<String, ByteString>,
) -> Result<(BTreeMap<String, ByteString>, bool)> {
    let mut data = existing.clone();
    let mut changed = false;

    for key in SECRET_KEYS {
        if data.get(key).map_or(true, |v| v.0.is_empty()) {
            let value = if key == "hec_token" {
                generate_hec_token()
            } else {
                generate_secret(SECRET_LENGTH)
            };
            data.insert(key.to_string(), ByteString(value.into_bytes()));
            changed = true;
        }
    }

    if changed || !data.contains_key(DEFAULTS_KEY) {
        let rendered = render_defaults(&data)?;
        data.insert(DEFAULTS_KEY.to_string(), ByteString(rendered.into_bytes()));
        changed = true;
    }

    Ok((data, changed))
}

#[derive(Serialize)]
struct AnsibleDefaults<'a> {
    splunk: SplunkDefaults<'a>,
}

#[derive(Serialize)]
struct SplunkDefaults<'a> {
    hec_token: &'a str,
    password: &'a str,
    #[serde(rename = "pass4SymmKey")]
    pass4_symm_key: &'a str,
    idxc: ClusterSecret<'a>,
    shc: ClusterSecret<'a>,
}

#[derive(Serialize)]
struct ClusterSecret<'a> {
    secret: &'a str,
}

fn render_defaults(data: &BTreeMap<String, ByteString>) -> Result<String> {
    let value = |key: &str| -> Result<&str> {
        let bytes = data
            .get(key)
            .ok_or_else(|| Error::ConfigError(format!("secret key {key} is missing")))?;
        std::str::from_utf8(&bytes.0)
            .map_err(|e| Error::ConfigError(format!("secret key {key} is not UTF-8: {e}")))
    };

    let defaults = AnsibleDefaults {
        splunk: SplunkDefaults {
            hec_token: value("hec_token")?,
            password: value("password")?,
            pass4_symm_key: value("pass4SymmKey")?,
            idxc: ClusterSecret {
                secret: value("idxc_secret")?,
            },
            shc: ClusterSecret {
                secret: value("shc_secret")?,
            },
        },
    };

    serde_yaml::to_string(&defaults)
        .map_err(|e| Error::ConfigError(format!("failed to render {DEFAULTS_KEY}: {e}")))
}

fn generate_secret(length: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), length)
}

/// Random token in the 8-4-4-4-12 hex layout Splunk uses for HEC tokens
fn generate_hec_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.gen();
    let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}
