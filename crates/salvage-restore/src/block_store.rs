//! Block storage provider interface

use async_trait::async_trait;
use salvage_common::Unstructured;

#[cfg(test)]
use mockall::automock;

use crate::error::RestoreError;

/// Creates volumes from snapshots on the storage provider
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Create a new volume from a snapshot, returning the provider's volume ID
    async fn create_volume_from_snapshot(
        &self,
        snapshot_id: &str,
        volume_type: &str,
        availability_zone: &str,
        iops: Option<i64>,
    ) -> Result<String, RestoreError>;

    /// Point a PersistentVolume document at a provider volume
    fn set_volume_id(
        &self,
        pv: Unstructured,
        volume_id: &str,
    ) -> Result<Unstructured, RestoreError>;
}
