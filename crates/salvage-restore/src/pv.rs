//! PersistentVolume restoration from block-storage snapshots

use std::collections::BTreeMap;
use std::sync::Arc;

use salvage_common::crd::{Backup, Restore, VolumeBackupInfo};
use salvage_common::Unstructured;
use tracing::info;

use crate::block_store::BlockStore;
use crate::error::RestoreError;

/// Prepares archived PersistentVolumes for creation, recreating their
/// backing volume from a snapshot when one was taken
pub struct PvRestorer {
    snapshot_volumes: Option<bool>,
    restore_pvs: Option<bool>,
    volume_backups: BTreeMap<String, VolumeBackupInfo>,
    block_store: Option<Arc<dyn BlockStore>>,
}

impl PvRestorer {
    /// Restorer for one restore of `backup`
    pub fn new(
        backup: &Backup,
        restore: &Restore,
        block_store: Option<Arc<dyn BlockStore>>,
    ) -> Self {
        Self {
            snapshot_volumes: backup.spec.snapshot_volumes,
            restore_pvs: restore.spec.restore_pvs,
            volume_backups: backup
                .status
                .as_ref()
                .map(|s| s.volume_backups.clone())
                .unwrap_or_default(),
            block_store,
        }
    }

    /// Whether a snapshot record exists for `pv_name`
    pub fn has_snapshot(&self, pv_name: &str) -> bool {
        self.volume_backups.contains_key(pv_name)
    }

    /// Strip the claim binding and storage class, then swap in a volume
    /// created from the PV's snapshot if snapshots are in play.
    pub async fn execute_pv_action(&self, mut pv: Unstructured) -> Result<Unstructured, RestoreError> {
        let name = pv.name().to_string();
        if name.is_empty() {
            return Err(RestoreError::Validation(
                "PersistentVolume is missing its name".to_string(),
            ));
        }

        let spec = pv.get_map_mut("spec")?;
        spec.remove("claimRef");
        spec.remove("storageClassName");

        if self.snapshot_volumes == Some(false) || self.restore_pvs == Some(false) {
            return Ok(pv);
        }
        let Some(info) = self.volume_backups.get(&name) else {
            return Ok(pv);
        };

        let block_store = self.block_store.as_ref().ok_or_else(|| {
            RestoreError::BlockStore(
                "a block store must be configured to restore PersistentVolumes from snapshots"
                    .to_string(),
            )
        })?;

        let volume_id = block_store
            .create_volume_from_snapshot(
                &info.snapshot_id,
                &info.volume_type,
                &info.availability_zone,
                info.iops,
            )
            .await?;
        info!(pv = %name, snapshot = %info.snapshot_id, volume = %volume_id, "Created volume from snapshot");

        block_store.set_volume_id(pv, &volume_id)
    }
}
