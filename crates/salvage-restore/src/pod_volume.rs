//! File-level pod volume restore interface
//!
//! Pod volumes backed up at file level are marked on the Pod with one
//! `snapshot.salvage.dev/<volume>: <snapshot id>` annotation per volume.
//! After such a Pod is recreated, a [`PodVolumeRestorer`] copies the data back.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use salvage_common::crd::Restore;
use salvage_common::{Unstructured, POD_VOLUME_SNAPSHOT_ANNOTATION_PREFIX};

#[cfg(test)]
use mockall::automock;

use crate::error::RestoreError;

/// Restores file-level volume data into recreated Pods
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodVolumeRestorer: Send + Sync {
    /// Restore every annotated volume of `pod`. Returns one error per failed volume.
    async fn restore_pod_volumes(&self, restore: &Restore, pod: &Unstructured) -> Vec<RestoreError>;
}

/// Creates a [`PodVolumeRestorer`] per restore
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodVolumeRestorerFactory: Send + Sync {
    /// Restorer bound to `restore`
    async fn new_restorer(
        &self,
        restore: &Restore,
    ) -> Result<Arc<dyn PodVolumeRestorer>, RestoreError>;
}

/// Volume name → snapshot ID for every file-level snapshot annotation
pub fn pod_snapshot_annotations(pod: &Unstructured) -> BTreeMap<String, String> {
    pod.annotations()
        .into_iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(POD_VOLUME_SNAPSHOT_ANNOTATION_PREFIX)
                .filter(|volume| !volume.is_empty())
                .map(|volume| (volume.to_string(), value))
        })
        .collect()
}
