//! Restore Custom Resource Definition
//!
//! A Restore names a Backup and narrows what gets replayed: namespace and
//! resource filters, a label selector, namespace renames and toggles for
//! cluster-scoped resources and PersistentVolumes.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::POD_VOLUME_TIMEOUT_ANNOTATION;

/// Phase of a Restore
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum RestorePhase {
    /// Not yet processed
    #[default]
    New,
    /// Items are being restored
    InProgress,
    /// Finished without errors (warnings allowed)
    Completed,
    /// Finished with at least one error
    PartiallyFailed,
    /// The request could not be started
    Failed,
}

impl std::fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "New"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Completed => write!(f, "Completed"),
            Self::PartiallyFailed => write!(f, "PartiallyFailed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Status of a Restore
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreStatus {
    /// Current phase
    #[serde(default)]
    pub phase: RestorePhase,

    /// Number of warnings recorded
    #[serde(default)]
    pub warnings: u32,

    /// Number of errors recorded
    #[serde(default)]
    pub errors: u32,
}

/// Specification for a Restore
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "salvage.dev",
    version = "v1",
    kind = "Restore",
    plural = "restores",
    namespaced,
    status = "RestoreStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Backup","type":"string","jsonPath":".spec.backupName"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSpec {
    /// Name of the Backup to restore from
    pub backup_name: String,

    /// Namespaces to restore (empty means all)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included_namespaces: Vec<String>,

    /// Namespaces to skip
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_namespaces: Vec<String>,

    /// Resource types to restore (empty means all)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included_resources: Vec<String>,

    /// Resource types to skip
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_resources: Vec<String>,

    /// Source namespace → target namespace renames
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub namespace_mapping: BTreeMap<String, String>,

    /// Only items matching this selector are restored; unset restores everything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<LabelSelector>,

    /// Whether cluster-scoped resources are restored. Unset means "yes".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_cluster_resources: Option<bool>,

    /// Whether PersistentVolumes are recreated from snapshots. Unset means "yes".
    #[serde(
        default,
        rename = "restorePVs",
        skip_serializing_if = "Option::is_none"
    )]
    pub restore_pvs: Option<bool>,
}

impl Restore {
    /// Target namespace for a namespace recorded in the backup
    pub fn mapped_namespace<'a>(&'a self, namespace: &'a str) -> &'a str {
        self.spec
            .namespace_mapping
            .get(namespace)
            .map_or(namespace, String::as_str)
    }

    /// Raw value of the pod volume timeout annotation, if set and non-empty
    pub fn pod_volume_timeout_annotation(&self) -> Option<&str> {
        self.annotations()
            .get(POD_VOLUME_TIMEOUT_ANNOTATION)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}
