//! Resource discovery
//!
//! Restores need to turn user-provided names ("deploy", "Deployment",
//! "deployments.apps") into canonical [`GroupResource`]s and to enumerate
//! every type a cluster serves. [`DiscoveryHelper`] abstracts that; the
//! kube-backed implementation lives in [`crate::cluster`].

use salvage_common::GroupResource;

#[cfg(test)]
use mockall::automock;

use crate::error::RestoreError;

/// One resource type within an API group version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResourceInfo {
    /// Plural name (e.g. "deployments")
    pub name: String,
    /// Singular name, when the server reports one
    pub singular_name: String,
    /// Kind (e.g. "Deployment")
    pub kind: String,
    /// Short names (e.g. "deploy")
    pub short_names: Vec<String>,
    /// Whether objects of this type live in a namespace
    pub namespaced: bool,
}

impl ApiResourceInfo {
    /// Resource info with no singular or short names
    pub fn new(name: &str, kind: &str, namespaced: bool) -> Self {
        Self {
            name: name.to_string(),
            singular_name: String::new(),
            kind: kind.to_string(),
            short_names: Vec::new(),
            namespaced,
        }
    }

    /// Add short names
    pub fn with_short_names(mut self, short_names: &[&str]) -> Self {
        self.short_names = short_names.iter().map(|s| s.to_string()).collect();
        self
    }

    fn matches(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.name == lower
            || self.singular_name == lower
            || self.kind.to_ascii_lowercase() == lower
            || self.short_names.iter().any(|s| *s == lower)
    }
}

/// All resource types of one API group version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiGroupResources {
    /// "v1", "apps/v1", ...
    pub group_version: String,
    /// Resource types served under this group version
    pub resources: Vec<ApiResourceInfo>,
}

impl ApiGroupResources {
    /// API group part of the group version ("" for core)
    pub fn group(&self) -> &str {
        self.group_version
            .split_once('/')
            .map_or("", |(group, _)| group)
    }
}

/// Resolves resource names against the cluster's served types
#[cfg_attr(test, automock)]
pub trait DiscoveryHelper: Send + Sync {
    /// Resolve a user-provided name to a canonical group resource.
    ///
    /// Accepts plural, singular, kind or short names, optionally qualified
    /// with a group (`deploy.apps`).
    fn resource_for(&self, name: &GroupResource) -> Result<GroupResource, RestoreError>;

    /// Every served resource, grouped by API group version
    fn resources(&self) -> Vec<ApiGroupResources>;
}

/// Discovery over a fixed list of API groups
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    groups: Vec<ApiGroupResources>,
}

impl StaticDiscovery {
    /// Discovery serving exactly `groups`
    pub fn new(groups: Vec<ApiGroupResources>) -> Self {
        Self { groups }
    }
}

impl DiscoveryHelper for StaticDiscovery {
    fn resource_for(&self, name: &GroupResource) -> Result<GroupResource, RestoreError> {
        // An unqualified name may still contain a group ("jobs.batch"); try the
        // bare form against every group first, then the qualified split.
        // The core group wins for names served by several groups ("events").
        let candidates = [GroupResource::parse(&name.to_string()), name.clone()];
        let core = self.groups.iter().filter(|g| g.group().is_empty());
        let named = self.groups.iter().filter(|g| !g.group().is_empty());
        let ordered: Vec<&ApiGroupResources> = core.chain(named).collect();
        for candidate in candidates.iter() {
            for group in &ordered {
                if !candidate.group.is_empty() && candidate.group != group.group() {
                    continue;
                }
                if let Some(found) = group.resources.iter().find(|r| r.matches(&candidate.resource)) {
                    return Ok(GroupResource::new(group.group(), found.name.clone()));
                }
            }
        }
        Err(RestoreError::Discovery(format!(
            "no resource found for {}",
            name
        )))
    }

    fn resources(&self) -> Vec<ApiGroupResources> {
        self.groups.clone()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A small cluster serving the core, apps and batch groups
    pub fn standard_discovery() -> StaticDiscovery {
        StaticDiscovery::new(vec![
            ApiGroupResources {
                group_version: "v1".to_string(),
                resources: vec![
                    ApiResourceInfo::new("namespaces", "Namespace", false).with_short_names(&["ns"]),
                    ApiResourceInfo::new("persistentvolumes", "PersistentVolume", false)
                        .with_short_names(&["pv"]),
                    ApiResourceInfo::new("persistentvolumeclaims", "PersistentVolumeClaim", true)
                        .with_short_names(&["pvc"]),
                    ApiResourceInfo::new("secrets", "Secret", true),
                    ApiResourceInfo::new("configmaps", "ConfigMap", true).with_short_names(&["cm"]),
                    ApiResourceInfo::new("serviceaccounts", "ServiceAccount", true)
                        .with_short_names(&["sa"]),
                    ApiResourceInfo::new("limitranges", "LimitRange", true),
                    ApiResourceInfo::new("pods", "Pod", true).with_short_names(&["po"]),
                    ApiResourceInfo::new("services", "Service", true).with_short_names(&["svc"]),
                ],
            },
            ApiGroupResources {
                group_version: "apps/v1".to_string(),
                resources: vec![
                    ApiResourceInfo::new("deployments", "Deployment", true)
                        .with_short_names(&["deploy"]),
                    ApiResourceInfo::new("replicasets", "ReplicaSet", true),
                ],
            },
            ApiGroupResources {
                group_version: "batch/v1".to_string(),
                resources: vec![ApiResourceInfo::new("jobs", "Job", true)],
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::standard_discovery;
    use super::*;

    fn resolve(name: &str) -> Result<String, RestoreError> {
        standard_discovery()
            .resource_for(&GroupResource::parse(name))
            .map(|gr| gr.to_string())
    }

    #[test]
    fn test_resolves_plural_kind_and_short_names() {
        assert_eq!(resolve("pods").unwrap(), "pods");
        assert_eq!(resolve("Pod").unwrap(), "pods");
        assert_eq!(resolve("pv").unwrap(), "persistentvolumes");
        assert_eq!(resolve("deploy").unwrap(), "deployments.apps");
        assert_eq!(resolve("jobs").unwrap(), "jobs.batch");
    }

    #[test]
    fn test_resolves_group_qualified_names() {
        assert_eq!(resolve("deployments.apps").unwrap(), "deployments.apps");
        assert_eq!(resolve("jobs.batch").unwrap(), "jobs.batch");
    }

    #[test]
    fn test_unknown_resource_fails() {
        assert!(matches!(resolve("widgets"), Err(RestoreError::Discovery(_))));
        assert!(resolve("pods.apps").is_err());
    }

    #[test]
    fn test_core_group_wins_for_shared_names() {
        // Named groups listed first, as API discovery orders them
        let discovery = StaticDiscovery::new(vec![
            ApiGroupResources {
                group_version: "events.k8s.io/v1".to_string(),
                resources: vec![ApiResourceInfo::new("events", "Event", true).with_short_names(&["ev"])],
            },
            ApiGroupResources {
                group_version: "v1".to_string(),
                resources: vec![ApiResourceInfo::new("events", "Event", true).with_short_names(&["ev"])],
            },
        ]);

        let resolve = |name: &str| {
            discovery
                .resource_for(&GroupResource::parse(name))
                .map(|gr| gr.to_string())
                .unwrap()
        };
        assert_eq!(resolve("events"), "events");
        assert_eq!(resolve("ev"), "events");
        assert_eq!(resolve("Event"), "events");
        assert_eq!(resolve("events.events.k8s.io"), "events.events.k8s.io");
    }

    #[test]
    fn test_group_of_group_version() {
        let groups = standard_discovery().resources();
        assert_eq!(groups[0].group(), "");
        assert_eq!(groups[1].group(), "apps");
    }
}
