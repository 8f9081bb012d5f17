//! Per-resource-type special cases
//!
//! A handful of resource types need extra handling during restore. Rather
//! than branching on the type throughout the item loop, [`KIND_HOOKS`] maps a
//! canonical resource name to the hooks the engine runs for it.

use salvage_common::resource::known;
use salvage_common::{FieldError, Unstructured};

use crate::error::RestoreError;

/// Annotation the kubelet sets on mirror Pods of static manifests
pub const MIRROR_POD_ANNOTATION: &str = "kubernetes.io/config.mirror";

/// Annotations recording that a claim was bound to its volume
pub const CLAIM_BINDING_ANNOTATIONS: &[&str] = &[
    "pv.kubernetes.io/bind-completed",
    "pv.kubernetes.io/bound-by-controller",
];

/// Decides whether an archived item finished its work and should not be recreated
pub type CompletionCheck = fn(&Unstructured) -> Result<bool, RestoreError>;

/// Work done on an item right before actions run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreCreateHook {
    /// Skip Pods managed by the kubelet
    SkipMirrorPod,
    /// Defer to dynamic provisioning or recreate from snapshot, then wait for Available
    RestorePersistentVolume,
    /// Unbind claims whose volume is left to dynamic provisioning
    ResetClaimForProvisioning,
}

/// Work done once an item was created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostCreateHook {
    /// Restore file-level volume backups into the new Pod
    RestorePodVolumes,
}

/// How to resolve a create that hit an existing, different object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictHook {
    /// Patch the live ServiceAccount with the backed-up secret references
    MergeServiceAccount,
}

/// Hooks registered for one resource type
#[derive(Debug, Clone, Copy, Default)]
pub struct KindHooks {
    /// Skip items that already ran to completion
    pub is_completed: Option<CompletionCheck>,
    /// Run before item actions
    pub pre_create: Option<PreCreateHook>,
    /// Run after a successful create
    pub post_create: Option<PostCreateHook>,
    /// Run when the object already exists and differs; otherwise a warning is recorded
    pub on_conflict: Option<ConflictHook>,
}

const NO_HOOKS: KindHooks = KindHooks {
    is_completed: None,
    pre_create: None,
    post_create: None,
    on_conflict: None,
};

/// Hook table keyed by canonical resource name
pub const KIND_HOOKS: &[(&str, KindHooks)] = &[
    (
        known::PODS,
        KindHooks {
            is_completed: Some(is_pod_completed),
            pre_create: Some(PreCreateHook::SkipMirrorPod),
            post_create: Some(PostCreateHook::RestorePodVolumes),
            on_conflict: None,
        },
    ),
    (
        known::JOBS,
        KindHooks {
            is_completed: Some(is_job_completed),
            pre_create: None,
            post_create: None,
            on_conflict: None,
        },
    ),
    (
        known::PERSISTENT_VOLUMES,
        KindHooks {
            is_completed: None,
            pre_create: Some(PreCreateHook::RestorePersistentVolume),
            post_create: None,
            on_conflict: None,
        },
    ),
    (
        known::PERSISTENT_VOLUME_CLAIMS,
        KindHooks {
            is_completed: None,
            pre_create: Some(PreCreateHook::ResetClaimForProvisioning),
            post_create: None,
            on_conflict: None,
        },
    ),
    (
        known::SERVICE_ACCOUNTS,
        KindHooks {
            is_completed: None,
            pre_create: None,
            post_create: None,
            on_conflict: Some(ConflictHook::MergeServiceAccount),
        },
    ),
];

/// Hooks for a canonical resource name; types without an entry get none
pub fn hooks_for(resource: &str) -> KindHooks {
    KIND_HOOKS
        .iter()
        .find(|(name, _)| *name == resource)
        .map_or(NO_HOOKS, |(_, hooks)| *hooks)
}

/// String at `path`; absent is `None`, any other type is an error
fn optional_string<'a>(item: &'a Unstructured, path: &str) -> Result<Option<&'a str>, RestoreError> {
    match item.get_string(path) {
        Ok(value) => Ok(Some(value)),
        Err(FieldError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Pods that Succeeded or Failed
pub fn is_pod_completed(pod: &Unstructured) -> Result<bool, RestoreError> {
    Ok(matches!(
        optional_string(pod, "status.phase")?,
        Some("Succeeded") | Some("Failed")
    ))
}

/// Jobs with a completion timestamp
pub fn is_job_completed(job: &Unstructured) -> Result<bool, RestoreError> {
    Ok(optional_string(job, "status.completionTime")?.is_some_and(|t| !t.is_empty()))
}

/// Pods created by the kubelet from a static manifest
pub fn is_mirror_pod(pod: &Unstructured) -> bool {
    pod.annotations()
        .get(MIRROR_POD_ANNOTATION)
        .is_some_and(|v| !v.is_empty())
}

/// PersistentVolumes that should be left to dynamic provisioning: no snapshot
/// to restore from and a `Delete` reclaim policy
pub fn should_provision_dynamically(pv: &Unstructured, has_snapshot: bool) -> bool {
    !has_snapshot && pv.string_or_none("spec.persistentVolumeReclaimPolicy") == Some("Delete")
}

/// PersistentVolumes reported Available
pub fn is_pv_ready(pv: &Unstructured) -> bool {
    pv.string_or_none("status.phase") == Some("Available")
}

/// Drop the volume binding of a claim whose volume is in `provisioning`.
///
/// Returns whether the claim was reset. A claim without `spec` is an error.
pub fn reset_claim_for_provisioning(
    pvc: &mut Unstructured,
    provisioning: impl Fn(&str) -> bool,
) -> Result<bool, RestoreError> {
    let spec = pvc.get_map_mut("spec")?;
    let bound_to_provisioned = spec
        .get("volumeName")
        .and_then(|v| v.as_str())
        .is_some_and(&provisioning);
    if !bound_to_provisioned {
        return Ok(false);
    }
    spec.remove("volumeName");

    let mut annotations = pvc.annotations();
    for key in CLAIM_BINDING_ANNOTATIONS {
        annotations.remove(*key);
    }
    pvc.set_annotations(annotations);
    Ok(true)
}
