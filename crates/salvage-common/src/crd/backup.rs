//! Backup Custom Resource Definition
//!
//! Only the fields the restore side consumes are modelled: what the backup
//! included, whether volumes were snapshotted, and the snapshot record for
//! each PersistentVolume.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Block-storage snapshot taken for one PersistentVolume
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeBackupInfo {
    /// Provider snapshot identifier
    #[serde(rename = "snapshotID")]
    pub snapshot_id: String,

    /// Provider volume type (e.g. "gp2")
    #[serde(rename = "type", default)]
    pub volume_type: String,

    /// Availability zone the volume lived in
    #[serde(default)]
    pub availability_zone: String,

    /// Provisioned IOPS, if the volume type has them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iops: Option<i64>,
}

/// Status of a Backup
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    /// Snapshot records keyed by PersistentVolume name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volume_backups: BTreeMap<String, VolumeBackupInfo>,
}

/// Specification for a Backup
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "salvage.dev",
    version = "v1",
    kind = "Backup",
    plural = "backups",
    namespaced,
    status = "BackupStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BackupSpec {
    /// Namespaces captured (empty means all)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included_namespaces: Vec<String>,

    /// Namespaces left out
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_namespaces: Vec<String>,

    /// Resource types captured (empty means all)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included_resources: Vec<String>,

    /// Resource types left out
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_resources: Vec<String>,

    /// Label selector applied at backup time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<LabelSelector>,

    /// Whether PersistentVolumes were snapshotted. Unset means "if possible".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_volumes: Option<bool>,
}

impl Backup {
    /// Snapshot record for a PersistentVolume, if one was taken
    pub fn volume_backup(&self, pv_name: &str) -> Option<&VolumeBackupInfo> {
        self.status.as_ref()?.volume_backups.get(pv_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_status_parses_snapshot_records() {
        let value = crate::yaml::parse_yaml(
            r#"
apiVersion: salvage.dev/v1
kind: Backup
metadata:
  name: nightly
  namespace: salvage
spec:
  snapshotVolumes: true
status:
  volumeBackups:
    pv-1:
      snapshotID: snap-123
      type: gp2
      availabilityZone: us-east-1a
      iops: 100
"#,
        )
        .expect("parse yaml");
        let backup: Backup = serde_json::from_value(value).expect("parse backup");

        assert_eq!(backup.spec.snapshot_volumes, Some(true));
        let info = backup.volume_backup("pv-1").expect("snapshot record");
        assert_eq!(info.snapshot_id, "snap-123");
        assert_eq!(info.volume_type, "gp2");
        assert_eq!(info.availability_zone, "us-east-1a");
        assert_eq!(info.iops, Some(100));
        assert!(backup.volume_backup("pv-2").is_none());
    }

    #[test]
    fn test_backup_without_status() {
        let backup = Backup::new("empty", BackupSpec::default());
        assert!(backup.volume_backup("anything").is_none());
        assert!(backup.spec.snapshot_volumes.is_none());
    }
}
