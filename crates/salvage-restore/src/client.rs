//! Untyped cluster access
//!
//! The engine restores arbitrary resource types, so it talks to the cluster
//! through [`DynamicClient`]s bound to one resource type and namespace.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::Namespace;
use salvage_common::{GroupVersionResource, Unstructured};
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

use crate::error::RestoreError;

/// A change observed on a watched resource type
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// Object created (or present when the watch started)
    Added(Unstructured),
    /// Object updated
    Modified(Unstructured),
    /// Object deleted
    Deleted(Unstructured),
}

impl WatchEvent {
    /// The object the event is about
    pub fn object(&self) -> &Unstructured {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => obj,
        }
    }
}

/// Client for one resource type in one namespace (or cluster-wide)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DynamicClient: Send + Sync {
    /// Create an object. An existing object yields [`RestoreError::AlreadyExists`].
    async fn create(&self, item: &Unstructured) -> Result<Unstructured, RestoreError>;

    /// Fetch an object by name
    async fn get(&self, name: &str) -> Result<Unstructured, RestoreError>;

    /// Apply a JSON merge patch
    async fn patch(&self, name: &str, merge_patch: &Value) -> Result<Unstructured, RestoreError>;

    /// Stream changes to objects of this type
    async fn watch(&self) -> Result<BoxStream<'static, WatchEvent>, RestoreError>;
}

/// Builds [`DynamicClient`]s
#[cfg_attr(test, automock)]
pub trait DynamicFactory: Send + Sync {
    /// Client for `gvr` objects of `kind`. An empty namespace means cluster scope.
    fn client_for(
        &self,
        gvr: &GroupVersionResource,
        kind: &str,
        namespace: &str,
    ) -> Result<Arc<dyn DynamicClient>, RestoreError>;
}

/// Namespace lifecycle operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NamespaceClient: Send + Sync {
    /// Create the namespace unless it already exists. Returns whether it was created.
    async fn ensure_namespace_exists(&self, namespace: &Namespace) -> Result<bool, RestoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_watch_event_object() {
        let obj = Unstructured::from_value(json!({"metadata": {"name": "pv-1"}})).unwrap();
        for event in [
            WatchEvent::Added(obj.clone()),
            WatchEvent::Modified(obj.clone()),
            WatchEvent::Deleted(obj.clone()),
        ] {
            assert_eq!(event.object().name(), "pv-1");
        }
    }
}
