//! Restoring the items of one resource type in one namespace

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use salvage_common::resource::parse_api_version;
use salvage_common::{
    FieldError, GroupResource, GroupVersionResource, Unstructured, BACKUP_NAME_LABEL,
    RESTORE_NAME_LABEL,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::RestoreContext;
use crate::action::ResolvedAction;
use crate::client::{DynamicClient, WatchEvent};
use crate::error::RestoreError;
use crate::hooks::{
    hooks_for, is_mirror_pod, is_pv_ready, reset_claim_for_provisioning, ConflictHook,
    PostCreateHook, PreCreateHook,
};
use crate::merge::{create_merge_patch, merge_service_accounts};
use crate::pod_volume::pod_snapshot_annotations;
use crate::result::{RestoreResult, TaskBarrier, TaskReport};
use crate::wait::{wait_for_ready, WatchHandle};

/// Metadata fields that survive into the restored object
const KEPT_METADATA: &[&str] = &["name", "namespace", "labels", "annotations"];

impl RestoreContext<'_> {
    /// Restore every archived item of `gr` from `source_namespace` into
    /// `namespace`. Both are empty for cluster-scoped types.
    ///
    /// Breaks when no client could be built for the type, in which case the
    /// remaining namespaces of the type are abandoned.
    pub(super) async fn restore_resource(
        &mut self,
        gr: &GroupResource,
        source_namespace: &str,
        namespace: &str,
        type_tasks: &mut TaskBarrier,
        warnings: &mut RestoreResult,
        errors: &mut RestoreResult,
    ) -> ControlFlow<()> {
        let resource = gr.to_string();

        if namespace.is_empty() && self.cluster_resources_disabled() {
            info!(resource = %resource, "Skipping resource because it's cluster-scoped");
            return ControlFlow::Continue(());
        }
        if namespace.is_empty() {
            info!(resource = %resource, "Restoring cluster level resource");
        } else {
            info!(resource = %resource, namespace = %namespace, "Restoring resource into namespace");
        }

        let ids = match self.archive.list_contents(gr, source_namespace) {
            Ok(ids) => ids,
            Err(e) => {
                errors.add(
                    namespace,
                    format!("error reading resource directory {}: {}", resource, e),
                );
                return ControlFlow::Continue(());
            }
        };
        if ids.is_empty() {
            return ControlFlow::Continue(());
        }

        let hooks = hooks_for(&resource);
        let actions: Vec<ResolvedAction> = self
            .actions
            .iter()
            .filter(|action| action.applies_to_scope(&resource, namespace))
            .cloned()
            .collect();

        let mut resource_client: Option<Arc<dyn DynamicClient>> = None;
        let mut watch_events: Option<broadcast::Receiver<WatchEvent>> = None;

        'items: for id in &ids {
            let mut obj = match self.read_item(gr, source_namespace, id) {
                Ok(obj) => obj,
                Err(e) => {
                    errors.add(
                        namespace,
                        format!("error reading item {:?} of {}: {}", id, resource, e),
                    );
                    continue;
                }
            };

            if !self.selector.matches(&obj.labels()) {
                continue;
            }

            if let Some(is_completed) = hooks.is_completed {
                match is_completed(&obj) {
                    Ok(false) => {}
                    Ok(true) => {
                        info!(item = %obj.display_name(), "Item is complete, skipping");
                        continue;
                    }
                    Err(e) => {
                        errors.add(
                            namespace,
                            format!(
                                "error checking completion of item {:?} of {}: {}",
                                id, resource, e
                            ),
                        );
                        continue;
                    }
                }
            }

            let client = match &resource_client {
                Some(client) => client.clone(),
                None => match self.client_for(gr, &obj, namespace) {
                    Ok(client) => {
                        resource_client = Some(client.clone());
                        client
                    }
                    Err(e) => {
                        errors.add_system(format!(
                            "error getting resource client for namespace {:?}, resource {}: {}",
                            namespace, resource, e
                        ));
                        return ControlFlow::Break(());
                    }
                },
            };

            match hooks.pre_create {
                Some(PreCreateHook::SkipMirrorPod) if is_mirror_pod(&obj) => {
                    info!(pod = %obj.display_name(), "Not restoring pod because it's a mirror pod");
                    continue;
                }
                Some(PreCreateHook::RestorePersistentVolume) => {
                    if self.provisioning.contains(obj.name()) {
                        debug!(pv = %obj.name(), "PersistentVolume left to dynamic provisioning");
                        continue;
                    }

                    obj = match self.pv_restorer.execute_pv_action(obj).await {
                        Ok(obj) => obj,
                        Err(e) => {
                            errors.add(
                                namespace,
                                format!("error executing PV action for item {:?}: {}", id, e),
                            );
                            continue;
                        }
                    };

                    if watch_events.is_none() {
                        match client.watch().await {
                            Ok(stream) => {
                                let handle = WatchHandle::spawn(stream);
                                watch_events = Some(handle.subscribe());
                                self.watches.push(handle);
                            }
                            Err(e) => {
                                errors.add(
                                    namespace,
                                    format!("error watching resource {}: {}", resource, e),
                                );
                                continue;
                            }
                        }
                    }
                    if let Some(events) = &watch_events {
                        type_tasks.spawn(wait_for_pv(
                            events.resubscribe(),
                            obj.name().to_string(),
                            self.config.pv_ready_timeout,
                        ));
                    }
                }
                Some(PreCreateHook::ResetClaimForProvisioning) => {
                    let provisioning = &self.provisioning;
                    match reset_claim_for_provisioning(&mut obj, |pv| provisioning.contains(pv)) {
                        Ok(true) => info!(
                            claim = %obj.display_name(),
                            "Resetting PersistentVolumeClaim for dynamic provisioning"
                        ),
                        Ok(false) => {}
                        Err(e) => {
                            errors.add(namespace, e.to_string());
                            continue;
                        }
                    }
                }
                _ => {}
            }

            for action in &actions {
                if !action.selector.matches(&obj.labels()) {
                    continue;
                }

                debug!(resource = %resource, item = %obj.display_name(), "Executing item action");
                match action.action.execute(obj, self.restore).await {
                    Ok(output) => {
                        if let Some(warning) = output.warning {
                            warnings.add(
                                namespace,
                                format!(
                                    "warning preparing item {:?} of {}: {}",
                                    id, resource, warning
                                ),
                            );
                        }
                        obj = output.item;
                    }
                    Err(e) => {
                        errors.add(
                            namespace,
                            format!("error preparing item {:?} of {}: {}", id, resource, e),
                        );
                        continue 'items;
                    }
                }
            }

            if let Err(e) = reset_metadata_and_status(&mut obj) {
                errors.add(namespace, e.to_string());
                continue;
            }
            if !namespace.is_empty() {
                obj.set_namespace(namespace);
            }
            add_restore_labels(
                &mut obj,
                &self.restore.name_any(),
                &self.restore.spec.backup_name,
            );

            let Some(created) = self
                .create_item(client.as_ref(), &resource, hooks.on_conflict, obj, namespace, warnings, errors)
                .await
            else {
                continue;
            };

            if hooks.post_create == Some(PostCreateHook::RestorePodVolumes)
                && !pod_snapshot_annotations(&created).is_empty()
            {
                self.restore_pod_volumes(created);
            }
        }

        ControlFlow::Continue(())
    }

    fn read_item(
        &self,
        gr: &GroupResource,
        namespace: &str,
        id: &str,
    ) -> Result<Unstructured, RestoreError> {
        let raw = self.archive.get(gr, namespace, id)?;
        Ok(Unstructured::from_slice(&raw)?)
    }

    /// Client for the type, versioned after the archived item
    fn client_for(
        &self,
        gr: &GroupResource,
        item: &Unstructured,
        namespace: &str,
    ) -> Result<Arc<dyn DynamicClient>, RestoreError> {
        let (group, version) = parse_api_version(item.api_version());
        let gvr = GroupVersionResource::new(group, version, gr.resource.clone());
        info!(kind = %item.kind(), api_version = %item.api_version(), "Getting client");
        self.dynamic_factory.client_for(&gvr, item.kind(), namespace)
    }

    /// Create `obj`, resolving conflicts with an existing object.
    ///
    /// Returns the created object, or `None` if nothing was created.
    #[allow(clippy::too_many_arguments)]
    async fn create_item(
        &self,
        client: &dyn DynamicClient,
        resource: &str,
        on_conflict: Option<ConflictHook>,
        obj: Unstructured,
        namespace: &str,
        warnings: &mut RestoreResult,
        errors: &mut RestoreResult,
    ) -> Option<Unstructured> {
        info!(kind = %obj.kind(), item = %obj.display_name(), "Restoring");
        let err = match client.create(&obj).await {
            Ok(created) => return Some(created),
            Err(e) => e,
        };

        if !err.is_already_exists() {
            info!(item = %obj.display_name(), error = %err, "Error restoring item");
            errors.add(
                namespace,
                format!("error restoring {} {}: {}", resource, obj.display_name(), err),
            );
            return None;
        }

        let mut live = match client.get(obj.name()).await {
            Ok(live) => live,
            Err(e) => {
                info!(item = %obj.display_name(), error = %e, "Error retrieving cluster version");
                warnings.add(
                    namespace,
                    format!(
                        "error retrieving cluster version of {}: {}",
                        obj.display_name(),
                        e
                    ),
                );
                return None;
            }
        };
        if let Err(e) = reset_metadata_and_status(&mut live) {
            info!(item = %obj.display_name(), error = %e, "Error resetting metadata of cluster version");
            warnings.add(namespace, e.to_string());
            return None;
        }

        // The live object can't carry this restore's labels yet
        let labels = obj.labels();
        add_restore_labels(
            &mut live,
            labels.get(RESTORE_NAME_LABEL).map_or("", String::as_str),
            labels.get(BACKUP_NAME_LABEL).map_or("", String::as_str),
        );

        if live == obj {
            debug!(item = %obj.display_name(), "Item already exists and is identical");
            return None;
        }

        match on_conflict {
            Some(ConflictHook::MergeServiceAccount) => {
                merge_service_account(client, &live, &obj, namespace, warnings).await;
            }
            None => warnings.add(
                namespace,
                format!(
                    "not restored: {} \"{}\" already exists and is different from backed up version",
                    obj.kind(),
                    obj.name()
                ),
            ),
        }
        None
    }

    /// Hand a created Pod's file-level volume backups to the pod volume restorer
    fn restore_pod_volumes(&mut self, pod: Unstructured) {
        let Some(restorer) = self.pod_volume_restorer.clone() else {
            warn!(pod = %pod.display_name(), "No pod volume restorer, not restoring pod's volumes");
            return;
        };

        let restore = self.restore.clone();
        let deadline = self.pod_volume_deadline;
        self.global_tasks.spawn(async move {
            let name = pod.display_name();
            match tokio::time::timeout_at(deadline, restorer.restore_pod_volumes(&restore, &pod))
                .await
            {
                Ok(failures) if failures.is_empty() => {
                    debug!(pod = %name, "Restored pod volumes");
                    Vec::new()
                }
                Ok(failures) => {
                    error!(pod = %name, failed = failures.len(), "Unable to complete pod volume restores");
                    failures
                        .into_iter()
                        .map(|e| {
                            TaskReport::Error(format!("error restoring volumes of pod {}: {}", name, e))
                        })
                        .collect()
                }
                Err(_) => {
                    warn!(pod = %name, "Pod volume restore deadline exceeded");
                    vec![TaskReport::Warning(format!(
                        "timeout reached restoring volumes of pod {}",
                        name
                    ))]
                }
            }
        });
    }
}

/// Patch the live ServiceAccount with the secret references of the backed-up one
async fn merge_service_account(
    client: &dyn DynamicClient,
    live: &Unstructured,
    backup: &Unstructured,
    namespace: &str,
    warnings: &mut RestoreResult,
) {
    let desired = match merge_service_accounts(live, backup) {
        Ok(desired) => desired,
        Err(e) => {
            info!(item = %backup.display_name(), error = %e, "Error merging secrets for ServiceAccount");
            warnings.add(namespace, e.to_string());
            return;
        }
    };

    let Some(patch) = create_merge_patch(&live.to_value(), &desired.to_value()) else {
        debug!(item = %backup.display_name(), "ServiceAccount already references every secret");
        return;
    };

    match client.patch(backup.name(), &patch).await {
        Ok(_) => info!(item = %backup.display_name(), "ServiceAccount successfully updated"),
        Err(e) => warnings.add(namespace, e.to_string()),
    }
}

/// Wait for a restored PersistentVolume to become Available
async fn wait_for_pv(
    events: broadcast::Receiver<WatchEvent>,
    name: String,
    timeout: Duration,
) -> Vec<TaskReport> {
    match wait_for_ready(events, &name, is_pv_ready, timeout).await {
        Ok(_) => {
            debug!(pv = %name, "PersistentVolume is ready");
            Vec::new()
        }
        Err(RestoreError::Timeout { .. }) => {
            warn!(pv = %name, "Timeout reached waiting for persistent volume to become ready");
            vec![TaskReport::Warning(format!(
                "timeout reached waiting for persistent volume {} to become ready",
                name
            ))]
        }
        Err(e) => {
            warn!(pv = %name, error = %e, "Stopped waiting for persistent volume");
            vec![TaskReport::Warning(format!(
                "error waiting for persistent volume {} to become ready: {}",
                name, e
            ))]
        }
    }
}

/// Strip server-populated metadata and status
pub(super) fn reset_metadata_and_status(obj: &mut Unstructured) -> Result<(), FieldError> {
    obj.get_map_mut("metadata")?
        .retain(|key, _| KEPT_METADATA.contains(&key.as_str()));
    obj.as_map_mut().remove("status");
    Ok(())
}

/// Label an item with the restore that created it and the backup it came from
pub(super) fn add_restore_labels(obj: &mut Unstructured, restore_name: &str, backup_name: &str) {
    let mut labels = obj.labels();
    labels.insert(RESTORE_NAME_LABEL.to_string(), restore_name.to_string());
    labels.insert(BACKUP_NAME_LABEL.to_string(), backup_name.to_string());
    obj.set_labels(labels);
}
