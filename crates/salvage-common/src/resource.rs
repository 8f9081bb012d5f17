//! Resource type identity
//!
//! A [`GroupResource`] names a resource type independent of version. Its
//! canonical string form follows Kubernetes conventions: `<resource>` for the
//! core group and `<resource>.<group>` otherwise (e.g. `jobs.batch`). The same
//! string is used as the directory name inside backup archives and as the key
//! for include/exclude filters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// API group + plural resource name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupResource {
    /// API group ("" for the core group)
    pub group: String,
    /// Plural resource name (e.g., "pods")
    pub resource: String,
}

impl GroupResource {
    /// Create a new GroupResource
    pub fn new(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
        }
    }

    /// Parse the canonical `resource.group` form.
    ///
    /// Everything before the first dot is the resource, the rest is the group:
    /// `deployments.apps` → (apps, deployments), `pods` → ("", pods).
    pub fn parse(s: &str) -> Self {
        match s.split_once('.') {
            Some((resource, group)) => Self::new(group, resource),
            None => Self::new("", s),
        }
    }

    /// Whether this is a core (empty group) resource
    pub fn is_core(&self) -> bool {
        self.group.is_empty()
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

/// API group + version + plural resource name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionResource {
    /// API group ("" for the core group)
    pub group: String,
    /// API version (e.g., "v1")
    pub version: String,
    /// Plural resource name
    pub resource: String,
}

impl GroupVersionResource {
    /// Create a new GroupVersionResource
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// Drop the version
    pub fn group_resource(&self) -> GroupResource {
        GroupResource::new(self.group.clone(), self.resource.clone())
    }

    /// The `apiVersion` string for this resource (e.g. "apps/v1", "v1")
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// Whether a resource type's instances are cluster-wide or namespace-scoped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceScope {
    /// Cluster-wide resource
    Cluster,
    /// Namespace-scoped resource
    Namespaced,
}

/// Parse an `apiVersion` into (group, version).
///
/// ```
/// use salvage_common::resource::parse_api_version;
///
/// assert_eq!(parse_api_version("apps/v1"), ("apps".to_string(), "v1".to_string()));
/// assert_eq!(parse_api_version("v1"), (String::new(), "v1".to_string()));
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Canonical names of resource types the restore engine treats specially
pub mod known {
    /// `namespaces`
    pub const NAMESPACES: &str = "namespaces";
    /// `pods`
    pub const PODS: &str = "pods";
    /// `jobs.batch`
    pub const JOBS: &str = "jobs.batch";
    /// `persistentvolumes`
    pub const PERSISTENT_VOLUMES: &str = "persistentvolumes";
    /// `persistentvolumeclaims`
    pub const PERSISTENT_VOLUME_CLAIMS: &str = "persistentvolumeclaims";
    /// `serviceaccounts`
    pub const SERVICE_ACCOUNTS: &str = "serviceaccounts";
}
