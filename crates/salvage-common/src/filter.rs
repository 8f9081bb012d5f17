//! Include/exclude filters for namespaces and resource types
//!
//! Exclusions always win. An empty include list, or one containing `*`,
//! admits everything not excluded.

use std::collections::BTreeSet;

/// Wildcard entry matching every value
pub const WILDCARD: &str = "*";

/// A pair of include and exclude lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludesExcludes {
    includes: BTreeSet<String>,
    excludes: BTreeSet<String>,
}

impl IncludesExcludes {
    /// Create an empty filter that admits everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Add entries to the include list
    pub fn includes<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.includes.extend(items.into_iter().map(Into::into));
        self
    }

    /// Add entries to the exclude list
    pub fn excludes<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes.extend(items.into_iter().map(Into::into));
        self
    }

    /// Build a filter whose entries are passed through `map` first.
    ///
    /// The wildcard is kept as-is. The mapping may fail, in which case the
    /// whole build fails.
    pub fn try_generate<E>(
        includes: &[String],
        excludes: &[String],
        mut map: impl FnMut(&str) -> Result<String, E>,
    ) -> Result<Self, E> {
        let mut resolve = |items: &[String]| -> Result<BTreeSet<String>, E> {
            items
                .iter()
                .map(|item| {
                    if item == WILDCARD {
                        Ok(WILDCARD.to_string())
                    } else {
                        map(item)
                    }
                })
                .collect()
        };

        Ok(Self {
            includes: resolve(includes)?,
            excludes: resolve(excludes)?,
        })
    }

    /// Whether `value` passes the filter
    pub fn should_include(&self, value: &str) -> bool {
        if self.excludes.contains(WILDCARD) || self.excludes.contains(value) {
            return false;
        }
        self.includes.is_empty() || self.includes.contains(WILDCARD) || self.includes.contains(value)
    }

    /// The include list
    pub fn included(&self) -> impl Iterator<Item = &str> {
        self.includes.iter().map(String::as_str)
    }

    /// The exclude list
    pub fn excluded(&self) -> impl Iterator<Item = &str> {
        self.excludes.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_includes_everything() {
        let f = IncludesExcludes::new();
        assert!(f.should_include("default"));
        assert!(f.should_include("kube-system"));
    }

    #[test]
    fn test_excludes_win_over_includes() {
        let f = IncludesExcludes::new()
            .includes(["a", "b"])
            .excludes(["b"]);
        assert!(f.should_include("a"));
        assert!(!f.should_include("b"));
        assert!(!f.should_include("c"));
    }

    #[test]
    fn test_wildcards() {
        let f = IncludesExcludes::new().includes(["*"]).excludes(["secret"]);
        assert!(f.should_include("anything"));
        assert!(!f.should_include("secret"));

        let f = IncludesExcludes::new().excludes(["*"]);
        assert!(!f.should_include("anything"));
    }

    #[test]
    fn test_try_generate_maps_entries_but_not_wildcard() {
        let f = IncludesExcludes::try_generate::<String>(
            &["deploy".to_string(), "*".to_string()],
            &["po".to_string()],
            |s| {
                Ok(match s {
                    "deploy" => "deployments.apps".to_string(),
                    "po" => "pods".to_string(),
                    other => other.to_string(),
                })
            },
        )
        .unwrap();

        assert_eq!(f.included().collect::<Vec<_>>(), vec!["*", "deployments.apps"]);
        assert!(!f.should_include("pods"));
        assert!(f.should_include("services"));
    }

    #[test]
    fn test_try_generate_propagates_failure() {
        let result = IncludesExcludes::try_generate(&["bogus".to_string()], &[], |s| {
            Err(format!("unknown resource {}", s))
        });
        assert_eq!(result.unwrap_err(), "unknown resource bogus");
    }
}
