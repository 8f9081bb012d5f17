//! Untyped resource documents
//!
//! [`Unstructured`] wraps a JSON object and offers dotted-path accessors that
//! report a missing or mistyped field as a [`FieldError`] instead of panicking.
//! The restore engine works exclusively on these documents since it has to
//! handle every resource type a cluster might serve.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Failure to access a field of an untyped document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// The path does not exist
    #[error("field {path} not found")]
    NotFound {
        /// Dotted path that was looked up
        path: String,
    },

    /// The path exists but holds a different JSON type
    #[error("field {path} is not a {expected}")]
    WrongType {
        /// Dotted path that was looked up
        path: String,
        /// Expected JSON type ("string", "object", ...)
        expected: &'static str,
    },
}

/// An untyped Kubernetes resource document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Unstructured(Map<String, Value>);

impl Unstructured {
    /// Wrap a JSON value; fails unless it is an object
    pub fn from_value(value: Value) -> Result<Self, FieldError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(FieldError::WrongType {
                path: String::new(),
                expected: "object",
            }),
        }
    }

    /// Parse a JSON document
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Borrow the underlying object
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Mutably borrow the underlying object
    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Consume into a JSON value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Clone into a JSON value
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Look up a dotted path (e.g. "spec.persistentVolumeReclaimPolicy")
    pub fn get(&self, path: &str) -> Result<&Value, FieldError> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = self.0.get(first).ok_or_else(|| not_found(path))?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment).ok_or_else(|| not_found(path))?,
                _ => return Err(not_found(path)),
            };
        }
        Ok(current)
    }

    /// String at a dotted path
    pub fn get_string(&self, path: &str) -> Result<&str, FieldError> {
        self.get(path)?.as_str().ok_or(FieldError::WrongType {
            path: path.to_string(),
            expected: "string",
        })
    }

    /// Object at a dotted path
    pub fn get_map(&self, path: &str) -> Result<&Map<String, Value>, FieldError> {
        self.get(path)?.as_object().ok_or(FieldError::WrongType {
            path: path.to_string(),
            expected: "object",
        })
    }

    /// Mutable object at a dotted path
    pub fn get_map_mut(&mut self, path: &str) -> Result<&mut Map<String, Value>, FieldError> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = self.0.get_mut(first).ok_or_else(|| not_found(path))?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get_mut(segment).ok_or_else(|| not_found(path))?,
                _ => return Err(not_found(path)),
            };
        }
        current.as_object_mut().ok_or(FieldError::WrongType {
            path: path.to_string(),
            expected: "object",
        })
    }

    /// Optional string at a dotted path; absent and mistyped both yield `None`
    pub fn string_or_none(&self, path: &str) -> Option<&str> {
        self.get_string(path).ok()
    }

    /// `apiVersion`
    pub fn api_version(&self) -> &str {
        self.string_or_none("apiVersion").unwrap_or_default()
    }

    /// `kind`
    pub fn kind(&self) -> &str {
        self.string_or_none("kind").unwrap_or_default()
    }

    /// `metadata.name`
    pub fn name(&self) -> &str {
        self.string_or_none("metadata.name").unwrap_or_default()
    }

    /// `metadata.namespace`
    pub fn namespace(&self) -> &str {
        self.string_or_none("metadata.namespace").unwrap_or_default()
    }

    /// Set `metadata.namespace`, creating `metadata` if needed
    pub fn set_namespace(&mut self, namespace: &str) {
        self.metadata_mut()
            .insert("namespace".to_string(), Value::String(namespace.to_string()));
    }

    /// `metadata.labels` (string values only)
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.string_map("metadata.labels")
    }

    /// Replace `metadata.labels`
    pub fn set_labels(&mut self, labels: BTreeMap<String, String>) {
        self.set_string_map("labels", labels);
    }

    /// `metadata.annotations` (string values only)
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.string_map("metadata.annotations")
    }

    /// Replace `metadata.annotations`; an empty map removes the field
    pub fn set_annotations(&mut self, annotations: BTreeMap<String, String>) {
        self.set_string_map("annotations", annotations);
    }

    /// `namespace/name` or just `name` for cluster-scoped items
    pub fn display_name(&self) -> String {
        let namespace = self.namespace();
        if namespace.is_empty() {
            self.name().to_string()
        } else {
            format!("{}/{}", namespace, self.name())
        }
    }

    fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        let metadata = self
            .0
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        match metadata {
            Value::Object(map) => map,
            _ => unreachable!("metadata was just replaced with an object"),
        }
    }

    fn string_map(&self, path: &str) -> BTreeMap<String, String> {
        self.get_map(path)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_string_map(&mut self, key: &str, values: BTreeMap<String, String>) {
        let metadata = self.metadata_mut();
        if values.is_empty() {
            metadata.remove(key);
            return;
        }
        let map: Map<String, Value> = values
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        metadata.insert(key.to_string(), Value::Object(map));
    }
}

impl TryFrom<Value> for Unstructured {
    type Error = FieldError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<Unstructured> for Value {
    fn from(item: Unstructured) -> Self {
        item.into_value()
    }
}

fn not_found(path: &str) -> FieldError {
    FieldError::NotFound {
        path: path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_pv() -> Unstructured {
        Unstructured::from_value(json!({
            "apiVersion": "v1",
            "kind": "PersistentVolume",
            "metadata": {
                "name": "pv-1",
                "labels": {"app": "db", "count": 3}
            },
            "spec": {
                "persistentVolumeReclaimPolicy": "Delete",
                "capacity": {"storage": "1Gi"}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_get_string_paths() {
        let pv = sample_pv();
        assert_eq!(pv.get_string("spec.persistentVolumeReclaimPolicy"), Ok("Delete"));
        assert_eq!(pv.name(), "pv-1");
        assert_eq!(pv.namespace(), "");
        assert_eq!(pv.kind(), "PersistentVolume");
    }

    #[test]
    fn test_missing_and_wrong_type() {
        let pv = sample_pv();
        assert_eq!(
            pv.get_string("status.phase"),
            Err(FieldError::NotFound {
                path: "status.phase".to_string()
            })
        );
        assert_eq!(
            pv.get_string("spec.capacity"),
            Err(FieldError::WrongType {
                path: "spec.capacity".to_string(),
                expected: "string"
            })
        );
        assert!(matches!(
            pv.get_map("spec.persistentVolumeReclaimPolicy"),
            Err(FieldError::WrongType { .. })
        ));
        // Walking through a scalar is a miss, not a panic
        assert!(matches!(
            pv.get("spec.persistentVolumeReclaimPolicy.deeper"),
            Err(FieldError::NotFound { .. })
        ));
    }

    #[test]
    fn test_get_map_mut_edits_in_place() {
        let mut pv = sample_pv();
        pv.get_map_mut("spec").unwrap().remove("capacity");
        assert!(pv.get("spec.capacity").is_err());
    }

    #[test]
    fn test_labels_skip_non_strings() {
        let pv = sample_pv();
        let labels = pv.labels();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("app").map(String::as_str), Some("db"));
    }

    #[test]
    fn test_setters_create_metadata() {
        let mut item = Unstructured::from_value(json!({"kind": "ConfigMap"})).unwrap();
        item.set_namespace("prod");
        item.set_labels(BTreeMap::from([("a".to_string(), "b".to_string())]));
        assert_eq!(item.namespace(), "prod");
        assert_eq!(item.labels().get("a").map(String::as_str), Some("b"));

        item.set_annotations(BTreeMap::new());
        assert!(item.get("metadata.annotations").is_err());
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Unstructured::from_value(json!([1, 2])).is_err());
        assert!(Unstructured::from_slice(b"{\"kind\":\"Pod\"}").is_ok());
    }
}
