//! Conflict merging for objects that already exist on the target cluster

use std::collections::HashSet;

use salvage_common::{FieldError, Unstructured};
use serde_json::{Map, Value};

/// Fields of a ServiceAccount holding name references
const SERVICE_ACCOUNT_REF_FIELDS: &[&str] = &["secrets", "imagePullSecrets"];

/// Live ServiceAccount extended with the secret references the backed-up one
/// had. Live entries keep their order; backed-up entries whose name is not
/// already referenced are appended.
pub fn merge_service_accounts(
    live: &Unstructured,
    backup: &Unstructured,
) -> Result<Unstructured, FieldError> {
    let mut desired = live.clone();

    for field in SERVICE_ACCOUNT_REF_FIELDS {
        let live_refs = ref_list(live, field)?;
        let backup_refs = ref_list(backup, field)?;
        if backup_refs.is_empty() {
            continue;
        }

        let mut seen: HashSet<String> = live_refs.iter().filter_map(ref_name).collect();
        let mut merged = live_refs;
        for entry in backup_refs {
            match ref_name(&entry) {
                Some(name) if seen.contains(&name) => {}
                Some(name) => {
                    seen.insert(name);
                    merged.push(entry);
                }
                None => merged.push(entry),
            }
        }
        desired
            .as_map_mut()
            .insert(field.to_string(), Value::Array(merged));
    }

    Ok(desired)
}

fn ref_list(item: &Unstructured, field: &str) -> Result<Vec<Value>, FieldError> {
    match item.as_map().get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(entries)) => Ok(entries.clone()),
        Some(_) => Err(FieldError::WrongType {
            path: field.to_string(),
            expected: "array",
        }),
    }
}

fn ref_name(entry: &Value) -> Option<String> {
    entry.get("name").and_then(Value::as_str).map(str::to_string)
}

/// JSON merge patch (RFC 7386) turning `original` into `modified`.
///
/// Returns `None` when the documents are equal. Removed keys are patched to
/// `null`, arrays are replaced whole.
pub fn create_merge_patch(original: &Value, modified: &Value) -> Option<Value> {
    match (original, modified) {
        (Value::Object(original), Value::Object(modified)) => {
            let mut patch = Map::new();
            for (key, old) in original {
                match modified.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(new) => {
                        if let Some(diff) = create_merge_patch(old, new) {
                            patch.insert(key.clone(), diff);
                        }
                    }
                }
            }
            for (key, new) in modified {
                if !original.contains_key(key) {
                    patch.insert(key.clone(), new.clone());
                }
            }
            (!patch.is_empty()).then_some(Value::Object(patch))
        }
        (original, modified) if original == modified => None,
        (_, modified) => Some(modified.clone()),
    }
}
