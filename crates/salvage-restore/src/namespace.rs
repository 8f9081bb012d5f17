//! Target namespace construction

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use salvage_common::resource::known;
use salvage_common::GroupResource;
use tracing::{debug, warn};

use crate::archive::ArchiveReader;

/// Namespace object to ensure before restoring into `target`.
///
/// When the backup captured `source` itself, its labels, annotations and spec
/// are carried over under the target name. Otherwise the namespace is bare.
pub fn namespace_from_archive(archive: &dyn ArchiveReader, source: &str, target: &str) -> Namespace {
    let bare = || Namespace {
        metadata: ObjectMeta {
            name: Some(target.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    let raw = match archive.get(&GroupResource::parse(known::NAMESPACES), "", source) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(namespace = %source, error = %e, "Namespace not in backup, creating bare namespace");
            return bare();
        }
    };

    let backed_up: Namespace = match serde_json::from_slice(&raw) {
        Ok(ns) => ns,
        Err(e) => {
            warn!(namespace = %source, error = %e, "Backed up namespace is malformed, creating bare namespace");
            return bare();
        }
    };

    Namespace {
        metadata: ObjectMeta {
            name: Some(target.to_string()),
            labels: backed_up.metadata.labels,
            annotations: backed_up.metadata.annotations,
            ..Default::default()
        },
        spec: backed_up.spec,
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MockArchiveReader;
    use crate::error::RestoreError;
    use serde_json::json;

    #[test]
    fn test_carries_labels_annotations_and_spec() {
        let mut archive = MockArchiveReader::new();
        archive
            .expect_get()
            .withf(|gr, ns, id| gr.to_string() == "namespaces" && ns.is_empty() && id == "ns-1")
            .returning(|_, _, _| {
                Ok(serde_json::to_vec(&json!({
                    "apiVersion": "v1",
                    "kind": "Namespace",
                    "metadata": {
                        "name": "ns-1",
                        "uid": "abc",
                        "resourceVersion": "42",
                        "labels": {"team": "a"},
                        "annotations": {"owner": "me"}
                    },
                    "spec": {"finalizers": ["kubernetes"]},
                    "status": {"phase": "Active"}
                }))
                .unwrap())
            });

        let ns = namespace_from_archive(&archive, "ns-1", "ns-2");
        assert_eq!(ns.metadata.name.as_deref(), Some("ns-2"));
        assert_eq!(ns.metadata.labels.unwrap()["team"], "a");
        assert_eq!(ns.metadata.annotations.unwrap()["owner"], "me");
        assert!(ns.metadata.uid.is_none());
        assert!(ns.metadata.resource_version.is_none());
        assert_eq!(
            ns.spec.unwrap().finalizers,
            Some(vec!["kubernetes".to_string()])
        );
        assert!(ns.status.is_none());
    }

    #[test]
    fn test_missing_namespace_is_bare() {
        let mut archive = MockArchiveReader::new();
        archive
            .expect_get()
            .returning(|_, _, _| Err(RestoreError::Archive("no such file".to_string())));

        let ns = namespace_from_archive(&archive, "ns-1", "ns-1");
        assert_eq!(ns.metadata.name.as_deref(), Some("ns-1"));
        assert!(ns.metadata.labels.is_none());
        assert!(ns.spec.is_none());
    }

    #[test]
    fn test_malformed_namespace_is_bare() {
        let mut archive = MockArchiveReader::new();
        archive
            .expect_get()
            .returning(|_, _, _| Ok(b"{not json".to_vec()));

        let ns = namespace_from_archive(&archive, "ns-1", "target");
        assert_eq!(ns.metadata.name.as_deref(), Some("target"));
        assert!(ns.metadata.labels.is_none());
    }
}
