//! Restore orchestration
//!
//! A restore walks resource types in priority order. Cluster-scoped types are
//! restored once; namespaced types once per archived namespace, after the
//! (possibly remapped) target namespace is confirmed to exist. Items are
//! restored sequentially; only waits run in the background:
//!
//! ```text
//! restore()
//!  ├─ resolve selector, resource filter, priorities, actions   (fail → 1 system error)
//!  ├─ extract archive                                          (fail → 1 system error)
//!  ├─ collect PVs left to dynamic provisioning
//!  ├─ for each resource type
//!  │   ├─ for each namespace (or once, cluster-scoped)
//!  │   │   └─ restore items ── PV readiness waits ──► per-type barrier
//!  │   │                   └─ pod volume restores ──► whole-restore barrier
//!  │   └─ join per-type barrier
//!  ├─ stop watches, join whole-restore barrier
//!  └─ close archive
//! ```

mod item;


use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use kube::ResourceExt;
use salvage_common::crd::{Backup, Restore};
use salvage_common::duration::parse_duration;
use salvage_common::resource::known;
use salvage_common::{GroupResource, IncludesExcludes, ResourceScope, Selector};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::action::{resolve_actions, ItemAction, ResolvedAction};
use crate::archive::{ArchiveReader, GzipTarArchive};
use crate::block_store::BlockStore;
use crate::client::{DynamicFactory, NamespaceClient};
use crate::config::RestoreConfig;
use crate::discovery::DiscoveryHelper;
use crate::error::RestoreError;
use crate::hooks::should_provision_dynamically;
use crate::namespace::namespace_from_archive;
use crate::pod_volume::{PodVolumeRestorer, PodVolumeRestorerFactory};
use crate::priority::{prioritize_resources, resolve_resource_filter};
use crate::pv::PvRestorer;
use crate::result::{RestoreResult, TaskBarrier};
use crate::wait::WatchHandle;

/// Restores a backup archive into a cluster
#[async_trait]
pub trait Restorer: Send + Sync {
    /// Restore `archive` as requested by `restore`.
    ///
    /// Returns `(warnings, errors)`. Nothing is returned as `Err`: every
    /// failure is recorded in the scope it happened in.
    async fn restore(
        &self,
        restore: &Restore,
        backup: &Backup,
        archive: Box<dyn ArchiveReader>,
        actions: &[Arc<dyn ItemAction>],
    ) -> (RestoreResult, RestoreResult);
}

/// [`Restorer`] driving a Kubernetes API server
pub struct KubernetesRestorer {
    discovery: Arc<dyn DiscoveryHelper>,
    dynamic_factory: Arc<dyn DynamicFactory>,
    namespace_client: Arc<dyn NamespaceClient>,
    block_store: Option<Arc<dyn BlockStore>>,
    pod_volume_restorer_factory: Option<Arc<dyn PodVolumeRestorerFactory>>,
    config: RestoreConfig,
}

impl KubernetesRestorer {
    /// Restorer without block store or pod volume support
    pub fn new(
        discovery: Arc<dyn DiscoveryHelper>,
        dynamic_factory: Arc<dyn DynamicFactory>,
        namespace_client: Arc<dyn NamespaceClient>,
        config: RestoreConfig,
    ) -> Self {
        Self {
            discovery,
            dynamic_factory,
            namespace_client,
            block_store: None,
            pod_volume_restorer_factory: None,
            config,
        }
    }

    /// Recreate snapshotted PersistentVolumes through `block_store`
    pub fn with_block_store(mut self, block_store: Arc<dyn BlockStore>) -> Self {
        self.block_store = Some(block_store);
        self
    }

    /// Restore file-level pod volume backups through `factory`
    pub fn with_pod_volume_restorer_factory(
        mut self,
        factory: Arc<dyn PodVolumeRestorerFactory>,
    ) -> Self {
        self.pod_volume_restorer_factory = Some(factory);
        self
    }

    /// Restore from a gzip-compressed tarball held in memory
    pub async fn restore_archive_bytes(
        &self,
        restore: &Restore,
        backup: &Backup,
        archive: Vec<u8>,
        actions: &[Arc<dyn ItemAction>],
    ) -> (RestoreResult, RestoreResult) {
        self.restore(
            restore,
            backup,
            Box::new(GzipTarArchive::from_bytes(archive)),
            actions,
        )
        .await
    }

    /// Resolve everything that has to be valid before the cluster is touched
    async fn plan(
        &self,
        restore: &Restore,
        actions: &[Arc<dyn ItemAction>],
    ) -> Result<RestorePlan, RestoreError> {
        let selector = Selector::from_label_selector(restore.spec.label_selector.as_ref())?;

        let resource_filter = resolve_resource_filter(
            self.discovery.as_ref(),
            &restore.spec.included_resources,
            &restore.spec.excluded_resources,
        )?;
        let prioritized = prioritize_resources(
            self.discovery.as_ref(),
            &self.config.resource_priorities,
            &resource_filter,
        )?;
        let actions = resolve_actions(actions, self.discovery.as_ref())?;

        let pod_volume_timeout = match restore.pod_volume_timeout_annotation() {
            Some(value) => parse_duration(value).unwrap_or_else(|e| {
                warn!(
                    value = %value,
                    error = %e,
                    "Unable to parse pod volume timeout annotation, using configured value"
                );
                self.config.pod_volume_timeout
            }),
            None => self.config.pod_volume_timeout,
        };

        let pod_volume_restorer = match &self.pod_volume_restorer_factory {
            Some(factory) => Some(factory.new_restorer(restore).await?),
            None => None,
        };

        Ok(RestorePlan {
            prioritized,
            selector,
            actions,
            pod_volume_deadline: Instant::now() + pod_volume_timeout,
            pod_volume_restorer,
        })
    }
}

/// What a restore resolved up front
struct RestorePlan {
    prioritized: Vec<GroupResource>,
    selector: Selector,
    actions: Vec<ResolvedAction>,
    pod_volume_deadline: Instant,
    pod_volume_restorer: Option<Arc<dyn PodVolumeRestorer>>,
}

#[async_trait]
impl Restorer for KubernetesRestorer {
    async fn restore(
        &self,
        restore: &Restore,
        backup: &Backup,
        mut archive: Box<dyn ArchiveReader>,
        actions: &[Arc<dyn ItemAction>],
    ) -> (RestoreResult, RestoreResult) {
        let mut warnings = RestoreResult::default();
        let mut errors = RestoreResult::default();

        info!(
            restore = %restore.name_any(),
            backup = %backup.name_any(),
            "Starting restore"
        );

        let plan = match self.plan(restore, actions).await {
            Ok(plan) => plan,
            Err(e) => {
                errors.add_system(e.to_string());
                return (warnings, errors);
            }
        };

        if let Err(e) = archive.extract() {
            info!(error = %e, "Error extracting backup archive");
            errors.add_system(format!("error extracting backup archive: {}", e));
            close_archive(archive.as_mut());
            return (warnings, errors);
        }

        let mut ctx = RestoreContext {
            restore,
            archive: archive.as_ref(),
            dynamic_factory: self.dynamic_factory.as_ref(),
            namespace_client: self.namespace_client.as_ref(),
            config: &self.config,
            prioritized: plan.prioritized,
            selector: plan.selector,
            namespace_filter: IncludesExcludes::new()
                .includes(restore.spec.included_namespaces.iter().cloned())
                .excludes(restore.spec.excluded_namespaces.iter().cloned()),
            actions: plan.actions,
            verified_namespaces: Arc::new(DashSet::new()),
            provisioning: Arc::new(DashSet::new()),
            watches: Vec::new(),
            global_tasks: TaskBarrier::new(),
            pod_volume_deadline: plan.pod_volume_deadline,
            pod_volume_restorer: plan.pod_volume_restorer,
            pv_restorer: PvRestorer::new(backup, restore, self.block_store.clone()),
        };
        ctx.execute(&mut warnings, &mut errors).await;
        ctx.finish(&mut warnings, &mut errors).await;

        close_archive(archive.as_mut());

        info!(
            restore = %restore.name_any(),
            warnings = warnings.len(),
            errors = errors.len(),
            "Restore finished"
        );
        (warnings, errors)
    }
}

fn close_archive(archive: &mut dyn ArchiveReader) {
    if let Err(e) = archive.close() {
        warn!(error = %e, "Failed to clean up extracted archive");
    }
}

/// State of one restore run
struct RestoreContext<'a> {
    restore: &'a Restore,
    archive: &'a dyn ArchiveReader,
    dynamic_factory: &'a dyn DynamicFactory,
    namespace_client: &'a dyn NamespaceClient,
    config: &'a RestoreConfig,
    prioritized: Vec<GroupResource>,
    selector: Selector,
    namespace_filter: IncludesExcludes,
    actions: Vec<ResolvedAction>,
    /// Target namespaces known to exist
    verified_namespaces: Arc<DashSet<String>>,
    /// PersistentVolumes left for the cluster to provision
    provisioning: Arc<DashSet<String>>,
    watches: Vec<WatchHandle>,
    global_tasks: TaskBarrier,
    pod_volume_deadline: Instant,
    pod_volume_restorer: Option<Arc<dyn PodVolumeRestorer>>,
    pv_restorer: PvRestorer,
}

impl RestoreContext<'_> {
    fn cluster_resources_disabled(&self) -> bool {
        self.restore.spec.include_cluster_resources == Some(false)
    }

    /// Walk every resource type in priority order
    async fn execute(&mut self, warnings: &mut RestoreResult, errors: &mut RestoreResult) {
        self.collect_provisioned_volumes();

        let resources = self.prioritized.clone();
        for gr in &resources {
            let resource = gr.to_string();
            // Namespaces are created on demand
            if resource == known::NAMESPACES {
                continue;
            }

            let scope = match self.archive.resource_scope(gr) {
                Ok(Some(scope)) => scope,
                Ok(None) => continue,
                Err(e) => {
                    errors.add_system(e.to_string());
                    return;
                }
            };

            let mut type_tasks = TaskBarrier::new();
            match scope {
                ResourceScope::Cluster => {
                    // Nothing left to abandon for a single call
                    let _ = self
                        .restore_resource(gr, "", "", &mut type_tasks, warnings, errors)
                        .await;
                }
                ResourceScope::Namespaced => {
                    let namespaces = match self.archive.list_namespaces(gr) {
                        Ok(namespaces) => namespaces,
                        Err(e) => {
                            errors.add_system(e.to_string());
                            return;
                        }
                    };

                    for source in &namespaces {
                        if !self.namespace_filter.should_include(source) {
                            info!(namespace = %source, "Skipping namespace");
                            continue;
                        }

                        let target = self.restore.mapped_namespace(source).to_string();
                        if let Err(e) = self.ensure_namespace(source, &target).await {
                            errors.add_system(format!(
                                "error ensuring namespace {} exists: {}",
                                target, e
                            ));
                            continue;
                        }

                        let flow = self
                            .restore_resource(gr, source, &target, &mut type_tasks, warnings, errors)
                            .await;
                        if flow.is_break() {
                            break;
                        }
                    }
                }
            }

            debug!(resource = %resource, pending = type_tasks.len(), "Waiting on resource tasks");
            let (type_warnings, type_errors) = type_tasks.wait().await.into_results();
            debug!(resource = %resource, "Done waiting on resource tasks");
            warnings.merge(type_warnings);
            errors.merge(type_errors);
        }
    }

    /// Create `target` (from the archived `source` namespace if present) unless
    /// it is already known to exist
    async fn ensure_namespace(&self, source: &str, target: &str) -> Result<(), RestoreError> {
        if self.verified_namespaces.contains(target) {
            return Ok(());
        }

        let namespace = namespace_from_archive(self.archive, source, target);
        let created = self
            .namespace_client
            .ensure_namespace_exists(&namespace)
            .await?;
        if created {
            info!(namespace = %target, "Created namespace");
        }
        self.verified_namespaces.insert(target.to_string());
        Ok(())
    }

    /// Record every archived PersistentVolume that will be left to dynamic
    /// provisioning, so claims can be reset whatever order types are walked in
    fn collect_provisioned_volumes(&self) {
        let pvs = GroupResource::parse(known::PERSISTENT_VOLUMES);
        if !self.prioritized.contains(&pvs) || self.cluster_resources_disabled() {
            return;
        }
        match self.archive.resource_scope(&pvs) {
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "Unable to look up PersistentVolumes in archive");
                return;
            }
        }

        let ids = match self.archive.list_contents(&pvs, "") {
            Ok(ids) => ids,
            Err(e) => {
                debug!(error = %e, "Unable to list PersistentVolumes in archive");
                return;
            }
        };

        for id in ids {
            let Some(pv) = self
                .archive
                .get(&pvs, "", &id)
                .ok()
                .and_then(|raw| salvage_common::Unstructured::from_slice(&raw).ok())
            else {
                // Reported when the item itself is restored
                continue;
            };
            if !self.selector.matches(&pv.labels()) {
                continue;
            }
            if should_provision_dynamically(&pv, self.pv_restorer.has_snapshot(pv.name())) {
                info!(
                    pv = %pv.name(),
                    "Not restoring PV because it doesn't have a snapshot and its reclaim policy is Delete"
                );
                self.provisioning.insert(pv.name().to_string());
            }
        }
    }

    /// Stop watches and join background work still running
    async fn finish(self, warnings: &mut RestoreResult, errors: &mut RestoreResult) {
        for watch in &self.watches {
            watch.stop();
        }

        debug!(pending = self.global_tasks.len(), "Waiting on restore tasks");
        let (task_warnings, task_errors) = self.global_tasks.wait().await.into_results();
        warnings.merge(task_warnings);
        errors.merge(task_errors);
    }
}
