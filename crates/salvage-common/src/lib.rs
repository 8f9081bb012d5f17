//! Common types for Salvage: CRDs, errors, filters, selectors and untyped documents

#![deny(missing_docs)]

pub mod crd;
pub mod duration;
pub mod error;
pub mod filter;
pub mod resource;
pub mod selector;
pub mod telemetry;
pub mod unstructured;
pub mod yaml;

pub use error::Error;
pub use filter::IncludesExcludes;
pub use resource::{GroupResource, GroupVersionResource, ResourceScope};
pub use selector::Selector;
pub use unstructured::{FieldError, Unstructured};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group for Salvage custom resources
pub const SALVAGE_GROUP: &str = "salvage.dev";

/// Label stamped on every restored item naming the backup it came from
pub const BACKUP_NAME_LABEL: &str = "salvage.dev/backup-name";

/// Label stamped on every restored item naming the restore that created it
pub const RESTORE_NAME_LABEL: &str = "salvage.dev/restore-name";

/// Restore annotation overriding the pod volume restore time budget (e.g. "90m")
pub const POD_VOLUME_TIMEOUT_ANNOTATION: &str = "salvage.dev/pod-volume-timeout";

/// Annotation prefix marking a pod volume that has a file-level snapshot.
/// The suffix is the volume name, the value is the snapshot ID.
pub const POD_VOLUME_SNAPSHOT_ANNOTATION_PREFIX: &str = "snapshot.salvage.dev/";
