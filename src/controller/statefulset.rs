//! StatefulSet apply and pod-level rollout
//!
//! Applying a StatefulSet only ever changes its pod template; the replica
//! count is owned by [`reconcile_statefulset_pods`], which moves the live
//! member count toward the target one step per reconcile cycle and recycles
//! outdated pods one at a time (the StatefulSets use the `OnDelete` strategy).

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info, instrument, warn};

use crate::crd::Phase;
use crate::error::{Error, Result};

use super::client::AppliedStatefulSet;

/// Label the StatefulSet controller stamps on every pod it creates
const REVISION_LABEL: &str = "controller-revision-hash";

/// Create the StatefulSet if absent, otherwise merge template changes into it
#[instrument(skip(client, revised), fields(name = %revised.name_any(), namespace = revised.namespace()))]
pub async fn apply_statefulset(client: &Client, revised: &StatefulSet) -> Result<AppliedStatefulSet> {
    let namespace = revised.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<StatefulSet> = Api::namespaced(client.clone(), &namespace);
    let name = revised.name_any();

    match api.get_opt(&name).await? {
        Some(mut current) => {
            if merge_statefulset_updates(&mut current, revised) {
                info!("Updating StatefulSet {}/{}", namespace, name);
                let updated = api.replace(&name, &PostParams::default(), &current).await?;
                Ok(AppliedStatefulSet {
                    phase: Phase::Updating,
                    statefulset: updated,
                })
            } else {
                debug!("StatefulSet {}/{} is up to date", namespace, name);
                Ok(AppliedStatefulSet {
                    phase: Phase::Ready,
                    statefulset: current,
                })
            }
        }
        None => {
            info!("Creating StatefulSet {}/{}", namespace, name);
            let created = api.create(&PostParams::default(), revised).await?;
            Ok(AppliedStatefulSet {
                phase: Phase::Pending,
                statefulset: created,
            })
        }
    }
}

/// Copy material pod-template differences from `revised` into `current`
///
/// Returns true when `current` was changed and needs to be written back.
/// Replicas and volume claim templates are never touched here.
pub fn merge_statefulset_updates(current: &mut StatefulSet, revised: &StatefulSet) -> bool {
    let (Some(current_spec), Some(revised_spec)) = (current.spec.as_mut(), revised.spec.as_ref())
    else {
        return false;
    };

    let current_template = &current_spec.template;
    let revised_template = &revised_spec.template;

    let labels_changed = current_template
        .metadata
        .as_ref()
        .and_then(|m| m.labels.as_ref())
        != revised_template
            .metadata
            .as_ref()
            .and_then(|m| m.labels.as_ref());

    let pod_changed = match (current_template.spec.as_ref(), revised_template.spec.as_ref()) {
        (Some(current_pod), Some(revised_pod)) => {
            current_pod.scheduler_name != revised_pod.scheduler_name
                || current_pod.affinity != revised_pod.affinity
                || current_pod.tolerations != revised_pod.tolerations
                || current_pod.volumes != revised_pod.volumes
                || current_pod.containers.len() != revised_pod.containers.len()
                || current_pod
                    .containers
                    .iter()
                    .zip(revised_pod.containers.iter())
                    .any(|(c, r)| {
                        c.image != r.image
                            || c.image_pull_policy != r.image_pull_policy
                            || c.env != r.env
                            || c.ports != r.ports
                            || c.resources != r.resources
                            || c.volume_mounts != r.volume_mounts
                    })
        }
        (None, None) => false,
        _ => true,
    };

    if labels_changed || pod_changed {
        current_spec.template = revised_template.clone();
        true
    } else {
        false
    }
}

/// One step of a pod-level rollout
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RolloutStep {
    /// Nothing to change this cycle; report the given phase
    Wait(Phase),
    /// Raise the StatefulSet's replica count
    ScaleUp { replicas: i32 },
    /// Lower the replica count by one and discard the removed pod's volumes
    ScaleDown { replicas: i32, removed_pod: String },
    /// Some pods run an old revision; look for one to recycle
    CheckRevisions { update_revision: String },
    /// Every member is ready and current
    Ready,
}

/// Decide the next rollout step for a live StatefulSet
pub fn plan_pod_rollout(statefulset: &StatefulSet, ready_replicas: i32, desired_replicas: i32) -> RolloutStep {
    let replicas = statefulset
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);

    // wait for the current generation of members to settle
    if ready_replicas < replicas {
        return if ready_replicas > 0 {
            RolloutStep::Wait(Phase::ScalingUp)
        } else {
            RolloutStep::Wait(Phase::Pending)
        };
    }
    if ready_replicas > replicas {
        return RolloutStep::Wait(Phase::ScalingDown);
    }

    if ready_replicas < desired_replicas {
        return RolloutStep::ScaleUp {
            replicas: desired_replicas,
        };
    }
    if ready_replicas > desired_replicas {
        let ordinal = ready_replicas - 1;
        return RolloutStep::ScaleDown {
            replicas: ordinal,
            removed_pod: pod_name(statefulset, ordinal),
        };
    }

    let status = statefulset.status.as_ref();
    let updated = status.and_then(|s| s.updated_replicas).unwrap_or(0);
    let current = status.map(|s| s.replicas).unwrap_or(0);
    match status.and_then(|s| s.update_revision.clone()) {
        Some(update_revision) if updated < current => RolloutStep::CheckRevisions { update_revision },
        _ => RolloutStep::Ready,
    }
}

/// Name of the pod with the given ordinal
pub fn pod_name(statefulset: &StatefulSet, ordinal: i32) -> String {
    format!("{}-{}", statefulset.name_any(), ordinal)
}

/// PVC names created for a pod from the StatefulSet's volume claim templates
pub fn pod_volume_claims(statefulset: &StatefulSet, pod: &str) -> Vec<String> {
    statefulset
        .spec
        .as_ref()
        .and_then(|s| s.volume_claim_templates.as_ref())
        .map(|templates| {
            templates
                .iter()
                .map(|t| format!("{}-{}", t.name_any(), pod))
                .collect()
        })
        .unwrap_or_default()
}

/// Whether a pod was created from an older StatefulSet revision
pub fn is_outdated(pod: &Pod, update_revision: &str) -> bool {
    pod.labels().get(REVISION_LABEL).map(String::as_str) != Some(update_revision)
}

/// Execute one rollout step against the cluster
#[instrument(skip(client, field_manager, statefulset), fields(name = %statefulset.name_any(), namespace = statefulset.namespace()))]
pub async fn reconcile_statefulset_pods(
    client: &Client,
    field_manager: &str,
    statefulset: &StatefulSet,
    ready_replicas: i32,
    desired_replicas: i32,
) -> Result<Phase> {
    let namespace = statefulset
        .namespace()
        .unwrap_or_else(|| "default".to_string());
    let name = statefulset.name_any();

    match plan_pod_rollout(statefulset, ready_replicas, desired_replicas) {
        RolloutStep::Wait(phase) => {
            debug!(
                "Waiting on StatefulSet {}/{} ({} ready): {}",
                namespace, name, ready_replicas, phase
            );
            Ok(phase)
        }
        RolloutStep::ScaleUp { replicas } => {
            info!("Scaling StatefulSet {}/{} up to {}", namespace, name, replicas);
            patch_replicas(client, field_manager, &namespace, &name, replicas).await?;
            Ok(Phase::ScalingUp)
        }
        RolloutStep::ScaleDown {
            replicas,
            removed_pod,
        } => {
            info!(
                "Scaling StatefulSet {}/{} down to {}, removing {}",
                namespace, name, replicas, removed_pod
            );
            patch_replicas(client, field_manager, &namespace, &name, replicas).await?;

            // a later scale up must start from clean volumes
            let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), &namespace);
            for claim in pod_volume_claims(statefulset, &removed_pod) {
                match pvcs.delete(&claim, &DeleteParams::default()).await {
                    Ok(_) => info!("Deleted PVC {}/{}", namespace, claim),
                    Err(kube::Error::Api(e)) if e.code == 404 => {
                        debug!("PVC {}/{} already gone", namespace, claim)
                    }
                    Err(e) => return Err(Error::KubeError(e)),
                }
            }
            Ok(Phase::ScalingDown)
        }
        RolloutStep::CheckRevisions { update_revision } => {
            let pods: Api<Pod> = Api::namespaced(client.clone(), &namespace);
            for ordinal in (0..ready_replicas).rev() {
                let member = pod_name(statefulset, ordinal);
                let Some(pod) = pods.get_opt(&member).await? else {
                    warn!("Pod {}/{} not found while checking revisions", namespace, member);
                    continue;
                };
                if is_outdated(&pod, &update_revision) {
                    // the StatefulSet controller recreates it from the latest template
                    info!("Recycling pod {}/{} onto revision {}", namespace, member, update_revision);
                    pods.delete(&member, &DeleteParams::default()).await?;
                    return Ok(Phase::Updating);
                }
            }
            Ok(Phase::Ready)
        }
        RolloutStep::Ready => Ok(Phase::Ready),
    }
}

async fn patch_replicas(
    client: &Client,
    field_manager: &str,
    namespace: &str,
    name: &str,
    replicas: i32,
) -> Result<()> {
    let api: Api<StatefulSet> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({ "spec": { "replicas": replicas } });
    api.patch(
        name,
        &PatchParams::apply(field_manager),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{StatefulSetSpec, StatefulSetStatus};
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn statefulset(replicas: i32, updated: i32, image: &str) -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some("splunk-idx-indexer".to_string()),
                namespace: Some("splunk".to_string()),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                replicas: Some(replicas),
                template: PodTemplateSpec {
                    metadata: None,
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "splunk".to_string(),
                            image: Some(image.to_string()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                volume_claim_templates: Some(vec![
                    PersistentVolumeClaim {
                        metadata: ObjectMeta {
                            name: Some("pvc-etc".to_string()),
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                    PersistentVolumeClaim {
                        metadata: ObjectMeta {
                            name: Some("pvc-var".to_string()),
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
            status: Some(StatefulSetStatus {
                replicas,
                ready_replicas: Some(replicas),
                updated_replicas: Some(updated),
                update_revision: Some("rev-2".to_string()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_waits_while_members_start() {
        let sts = statefulset(3, 3, "splunk:9");
        assert_eq!(plan_pod_rollout(&sts, 0, 3), RolloutStep::Wait(Phase::Pending));
        assert_eq!(plan_pod_rollout(&sts, 2, 3), RolloutStep::Wait(Phase::ScalingUp));
        assert_eq!(plan_pod_rollout(&sts, 4, 3), RolloutStep::Wait(Phase::ScalingDown));
    }

    #[test]
    fn test_scales_up_to_desired() {
        let sts = statefulset(3, 3, "splunk:9");
        assert_eq!(plan_pod_rollout(&sts, 3, 5), RolloutStep::ScaleUp { replicas: 5 });
    }

    #[test]
    fn test_scales_down_one_member_at_a_time() {
        let sts = statefulset(5, 5, "splunk:9");
        assert_eq!(
            plan_pod_rollout(&sts, 5, 2),
            RolloutStep::ScaleDown {
                replicas: 4,
                removed_pod: "splunk-idx-indexer-4".to_string(),
            }
        );
        assert_eq!(
            pod_volume_claims(&sts, "splunk-idx-indexer-4"),
            vec![
                "pvc-etc-splunk-idx-indexer-4".to_string(),
                "pvc-var-splunk-idx-indexer-4".to_string(),
            ]
        );
    }

    #[test]
    fn test_outdated_members_trigger_revision_check() {
        let sts = statefulset(3, 1, "splunk:9");
        assert_eq!(
            plan_pod_rollout(&sts, 3, 3),
            RolloutStep::CheckRevisions {
                update_revision: "rev-2".to_string()
            }
        );
        assert_eq!(plan_pod_rollout(&statefulset(3, 3, "splunk:9"), 3, 3), RolloutStep::Ready);
    }

    #[test]
    fn test_is_outdated() {
        let mut labels = BTreeMap::new();
        labels.insert(REVISION_LABEL.to_string(), "rev-1".to_string());
        let pod = Pod {
            metadata: ObjectMeta {
                labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(is_outdated(&pod, "rev-2"));
        assert!(!is_outdated(&pod, "rev-1"));
        assert!(is_outdated(&Pod::default(), "rev-1"));
    }

    #[test]
    fn test_merge_detects_image_change_and_keeps_replicas() {
        let mut current = statefulset(5, 5, "splunk:8");
        let revised = statefulset(3, 0, "splunk:9");

        assert!(merge_statefulset_updates(&mut current, &revised));
        let spec = current.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(5));
        assert_eq!(
            spec.template.spec.as_ref().unwrap().containers[0].image.as_deref(),
            Some("splunk:9")
        );

        // a second merge finds nothing left to change
        assert!(!merge_statefulset_updates(&mut current, &revised));
    }

    #[test]
    fn test_merge_ignores_replica_only_difference() {
        let mut current = statefulset(5, 5, "splunk:9");
        let revised = statefulset(3, 3, "splunk:9");
        assert!(!merge_statefulset_updates(&mut current, &revised));
    }
}
