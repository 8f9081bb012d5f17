//! YAML configuration parsing using yaml-rust2
//!
//! YAML is converted into `serde_json::Value` first so that every typed
//! structure only needs serde derives, no YAML-specific code.

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

use crate::Error;

/// Parse the first document of a YAML string into a JSON value.
///
/// Empty input yields `Value::Null`.
pub fn parse_yaml(input: &str) -> Result<Value, Error> {
    let docs = YamlLoader::load_from_str(input)
        .map_err(|e| Error::serialization(format!("invalid YAML: {}", e)))?;
    docs.into_iter()
        .next()
        .map_or(Ok(Value::Null), to_json)
}

/// Parse YAML straight into a typed value
pub fn from_yaml<T: DeserializeOwned>(input: &str) -> Result<T, Error> {
    let value = parse_yaml(input)?;
    serde_json::from_value(value).map_err(Error::from)
}

fn to_json(yaml: Yaml) -> Result<Value, Error> {
    Ok(match yaml {
        Yaml::Null => Value::Null,
        Yaml::Boolean(b) => Value::Bool(b),
        Yaml::Integer(i) => Value::Number(i.into()),
        Yaml::Real(raw) => {
            let f: f64 = raw
                .parse()
                .map_err(|_| Error::serialization(format!("invalid float {:?}", raw)))?;
            Number::from_f64(f).map_or(Value::Null, Value::Number)
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Array(items) => Value::Array(
            items
                .into_iter()
                .map(to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Yaml::Hash(hash) => {
            let mut map = Map::with_capacity(hash.len());
            for (key, value) in hash {
                let key = match key {
                    Yaml::String(s) | Yaml::Real(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Boolean(b) => b.to_string(),
                    other => {
                        return Err(Error::serialization(format!(
                            "unsupported YAML mapping key {:?}",
                            other
                        )))
                    }
                };
                map.insert(key, to_json(value)?);
            }
            Value::Object(map)
        }
        Yaml::Alias(_) => return Err(Error::serialization("YAML aliases are not supported")),
        Yaml::BadValue => return Err(Error::serialization("bad YAML value")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        resource_priorities: Vec<String>,
        timeout: String,
        #[serde(default)]
        retries: u32,
    }

    #[test]
    fn test_from_yaml_typed() {
        let sample: Sample = from_yaml(
            r#"
resourcePriorities:
  - namespaces
  - pods
timeout: 90s
retries: 3
"#,
        )
        .unwrap();
        assert_eq!(sample.resource_priorities, vec!["namespaces", "pods"]);
        assert_eq!(sample.timeout, "90s");
        assert_eq!(sample.retries, 3);
    }

    #[test]
    fn test_empty_input_is_null() {
        assert_eq!(parse_yaml("").unwrap(), Value::Null);
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(parse_yaml("key: [unclosed").is_err());
    }

    #[test]
    fn test_numeric_keys_become_strings() {
        let value = parse_yaml("1: one\ntrue: yes").unwrap();
        assert_eq!(value["1"], "one");
        assert_eq!(value["true"], "yes");
    }
}
