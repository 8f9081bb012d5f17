//! Restore engine for Salvage backups
//!
//! Recreates the Kubernetes objects captured in a backup archive on a target
//! cluster. The request (a `Restore` resource) selects what to restore and
//! where; the engine reports what went wrong as warnings and errors instead
//! of failing as a whole.
//!
//! ## Architecture
//!
//! ```text
//! Restore + Backup + archive
//!    │
//!    ├─ resolve label selector, resource filter, priorities, item actions
//!    ├─ extract gzip tarball into a scratch directory
//!    │
//!    ├─ for each resource type (priorities first, then sorted):
//!    │    └─ for each archived namespace (mapped to its target):
//!    │         ├─ ensure target namespace exists
//!    │         └─ for each item:
//!    │              ├─ skip: label selector, completed, mirror pod
//!    │              ├─ pre-create hook (PV from snapshot, PVC unbinding)
//!    │              ├─ item actions
//!    │              ├─ strip metadata and status, stamp restore labels
//!    │              ├─ create (conflict → merge or warning)
//!    │              └─ post-create hook (pod volume restore)
//!    │
//!    └─ wait for PV readiness and pod volume restores, clean up
//! ```
//!
//! ## Seams
//!
//! Everything touching the cluster or a storage provider sits behind a
//! trait: [`DiscoveryHelper`], [`DynamicFactory`], [`NamespaceClient`],
//! [`BlockStore`], [`PodVolumeRestorerFactory`] and [`ArchiveReader`]. The
//! [`cluster`] module implements the Kubernetes ones on top of `kube`.

#![deny(missing_docs)]

pub mod action;
pub mod archive;
pub mod block_store;
pub mod client;
pub mod cluster;
pub mod config;
pub mod discovery;
pub mod error;
pub mod hooks;
pub mod merge;
pub mod namespace;
pub mod pod_volume;
pub mod priority;
pub mod pv;
pub mod restore;
pub mod result;
pub mod wait;

pub use action::{ActionOutput, ItemAction, ResourceSelector};
pub use archive::{ArchiveReader, GzipTarArchive, GzipTarWriter};
pub use block_store::BlockStore;
pub use client::{DynamicClient, DynamicFactory, NamespaceClient, WatchEvent};
pub use cluster::{KubeDiscovery, KubeDynamicFactory, KubeNamespaceClient};
pub use config::RestoreConfig;
pub use discovery::{DiscoveryHelper, StaticDiscovery};
pub use error::RestoreError;
pub use pod_volume::{PodVolumeRestorer, PodVolumeRestorerFactory};
pub use restore::{KubernetesRestorer, Restorer};
pub use result::{restore_status, RestoreResult, TaskBarrier};
