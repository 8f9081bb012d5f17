//! Resource type ordering
//!
//! Restores walk resource types in one deterministic order: the configured
//! priority list first (namespaces, volumes, claims, ...), then everything
//! else the cluster serves sorted by canonical name. The order depends only
//! on configuration and discovery, so two restores of the same backup into
//! the same cluster create objects in the same sequence.

use std::collections::BTreeSet;

use salvage_common::{GroupResource, IncludesExcludes};
use tracing::info;

use crate::discovery::DiscoveryHelper;
use crate::error::RestoreError;

/// Build the filter for user-provided resource names, resolving each through
/// discovery. `*` is kept as-is; an unknown name fails the whole filter.
pub fn resolve_resource_filter(
    helper: &dyn DiscoveryHelper,
    includes: &[String],
    excludes: &[String],
) -> Result<IncludesExcludes, RestoreError> {
    IncludesExcludes::try_generate(includes, excludes, |name| {
        helper
            .resource_for(&GroupResource::parse(name))
            .map(|gr| gr.to_string())
    })
}

/// Order resource types for a restore.
///
/// Priority entries come first in configured order; a priority entry that
/// cannot be resolved fails the call, one excluded by `filter` is dropped.
/// Every other admitted resource follows, sorted and de-duplicated.
pub fn prioritize_resources(
    helper: &dyn DiscoveryHelper,
    priorities: &[String],
    filter: &IncludesExcludes,
) -> Result<Vec<GroupResource>, RestoreError> {
    let mut ordered = Vec::with_capacity(priorities.len());
    let mut seen = BTreeSet::new();

    for entry in priorities {
        let gr = helper.resource_for(&GroupResource::parse(entry))?;
        let canonical = gr.to_string();

        if !filter.should_include(&canonical) {
            info!(resource = %canonical, "Not including resource");
            continue;
        }
        if seen.insert(canonical) {
            ordered.push(gr);
        }
    }

    let mut remainder = BTreeSet::new();
    for group in helper.resources() {
        for resource in &group.resources {
            let gr = GroupResource::new(group.group(), resource.name.clone());
            let canonical = gr.to_string();

            if seen.contains(&canonical) {
                continue;
            }
            if !filter.should_include(&canonical) {
                info!(resource = %canonical, "Not including resource");
                continue;
            }
            remainder.insert(canonical);
        }
    }

    ordered.extend(remainder.iter().map(|name| GroupResource::parse(name)));
    Ok(ordered)
}
