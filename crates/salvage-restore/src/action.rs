//! Pluggable item transformations
//!
//! An [`ItemAction`] rewrites items before they are created, for example to
//! drop fields a new cluster would reject. Each action declares which items
//! it applies to; those filters are resolved once per restore.

use std::sync::Arc;

use async_trait::async_trait;
use salvage_common::crd::Restore;
use salvage_common::{IncludesExcludes, Selector, Unstructured};

#[cfg(test)]
use mockall::automock;

use crate::discovery::DiscoveryHelper;
use crate::error::RestoreError;
use crate::priority::resolve_resource_filter;

/// Which items an action wants to see. Empty lists mean "all".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSelector {
    /// Namespaces to include
    pub included_namespaces: Vec<String>,
    /// Namespaces to exclude
    pub excluded_namespaces: Vec<String>,
    /// Resource names to include, resolved through discovery
    pub included_resources: Vec<String>,
    /// Resource names to exclude, resolved through discovery
    pub excluded_resources: Vec<String>,
    /// Label selector expression (e.g. "app=web,tier!=db")
    pub label_selector: String,
}

/// What an action produced for one item
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutput {
    /// The transformed item
    pub item: Unstructured,
    /// Non-fatal problem to record against the item's scope
    pub warning: Option<String>,
}

impl ActionOutput {
    /// Output with no warning
    pub fn item(item: Unstructured) -> Self {
        Self {
            item,
            warning: None,
        }
    }
}

/// A transformation applied to matching items before creation
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ItemAction: Send + Sync {
    /// Items this action applies to. Called once per restore.
    fn applies_to(&self) -> ResourceSelector;

    /// Transform an item. An error skips the item.
    async fn execute(
        &self,
        item: Unstructured,
        restore: &Restore,
    ) -> Result<ActionOutput, RestoreError>;
}

/// An action with its filters resolved for the current cluster
#[derive(Clone)]
pub struct ResolvedAction {
    /// The action itself
    pub action: Arc<dyn ItemAction>,
    /// Canonical resource names the action applies to
    pub resource_filter: IncludesExcludes,
    /// Namespaces the action applies to
    pub namespace_filter: IncludesExcludes,
    /// Labels an item must carry
    pub selector: Selector,
}

impl ResolvedAction {
    /// Whether the action covers this resource type in this namespace.
    /// An empty namespace (cluster scope) skips the namespace check.
    pub fn applies_to_scope(&self, resource: &str, namespace: &str) -> bool {
        self.resource_filter.should_include(resource)
            && (namespace.is_empty() || self.namespace_filter.should_include(namespace))
    }
}

impl std::fmt::Debug for ResolvedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedAction")
            .field("resource_filter", &self.resource_filter)
            .field("namespace_filter", &self.namespace_filter)
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

/// Resolve every action's filters. Any malformed filter fails the whole call.
pub fn resolve_actions(
    actions: &[Arc<dyn ItemAction>],
    helper: &dyn DiscoveryHelper,
) -> Result<Vec<ResolvedAction>, RestoreError> {
    actions
        .iter()
        .map(|action| {
            let applies_to = action.applies_to();

            let resource_filter = resolve_resource_filter(
                helper,
                &applies_to.included_resources,
                &applies_to.excluded_resources,
            )?;
            let namespace_filter = IncludesExcludes::new()
                .includes(applies_to.included_namespaces)
                .excludes(applies_to.excluded_namespaces);
            let selector = if applies_to.label_selector.trim().is_empty() {
                Selector::everything()
            } else {
                Selector::parse(&applies_to.label_selector)?
            };

            Ok(ResolvedAction {
                action: Arc::clone(action),
                resource_filter,
                namespace_filter,
                selector,
            })
        })
        .collect()
}
