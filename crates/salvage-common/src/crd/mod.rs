//! Custom Resource Definitions for Salvage
//!
//! `Backup` carries the metadata captured when an archive was produced,
//! `Restore` is the request to replay one into a cluster.

mod backup;
mod restore;

pub use backup::{Backup, BackupSpec, BackupStatus, VolumeBackupInfo};
pub use restore::{Restore, RestorePhase, RestoreSpec, RestoreStatus};
