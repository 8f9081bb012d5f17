//! Restore engine configuration

use std::time::Duration;

use serde::Deserialize;

use salvage_common::duration::parse_duration;
use salvage_common::yaml::from_yaml;

use crate::error::RestoreError;

/// Default pod volume restore budget
pub const DEFAULT_POD_VOLUME_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Default wait for a restored PersistentVolume to become Available
pub const DEFAULT_PV_READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Resource types restored first, in this order
pub const DEFAULT_RESOURCE_PRIORITIES: &[&str] = &[
    "namespaces",
    "persistentvolumes",
    "persistentvolumeclaims",
    "secrets",
    "configmaps",
    "serviceaccounts",
    "limitranges",
    "pods",
];

/// Configuration for a [`KubernetesRestorer`](crate::KubernetesRestorer)
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreConfig {
    /// Resource types restored before everything else, in order
    pub resource_priorities: Vec<String>,
    /// Budget for pod volume restores unless the Restore annotation overrides it
    pub pod_volume_timeout: Duration,
    /// How long to wait for each restored PersistentVolume to become Available
    pub pv_ready_timeout: Duration,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            resource_priorities: DEFAULT_RESOURCE_PRIORITIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            pod_volume_timeout: DEFAULT_POD_VOLUME_TIMEOUT,
            pv_ready_timeout: DEFAULT_PV_READY_TIMEOUT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawRestoreConfig {
    resource_priorities: Option<Vec<String>>,
    pod_volume_timeout: Option<String>,
    pv_ready_timeout: Option<String>,
}

impl RestoreConfig {
    /// Load from YAML. Missing fields keep their defaults.
    ///
    /// ```yaml
    /// resourcePriorities: [namespaces, persistentvolumes, pods]
    /// podVolumeTimeout: 2h
    /// pvReadyTimeout: 90s
    /// ```
    pub fn from_yaml(input: &str) -> Result<Self, RestoreError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: RawRestoreConfig = from_yaml(input)?;
        let mut config = Self::default();

        if let Some(priorities) = raw.resource_priorities {
            config.resource_priorities = priorities;
        }
        if let Some(timeout) = raw.pod_volume_timeout {
            config.pod_volume_timeout = parse_duration(&timeout)?;
        }
        if let Some(timeout) = raw.pv_ready_timeout {
            config.pv_ready_timeout = parse_duration(&timeout)?;
            if config.pv_ready_timeout.is_zero() {
                return Err(RestoreError::Validation(
                    "pvReadyTimeout must be greater than zero".to_string(),
                ));
            }
        }
        Ok(config)
    }
}
