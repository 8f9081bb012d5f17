//! Label selectors
//!
//! Supports both the string form used by item actions (`app=web,tier in
//! (a,b),!legacy`) and the structured `LabelSelector` carried by restore
//! requests. An empty selector matches everything.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use crate::Error;

/// Comparison applied by a single requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `key=value` / `key==value`
    Equals,
    /// `key!=value`
    NotEquals,
    /// `key in (a,b)`
    In,
    /// `key notin (a,b)`
    NotIn,
    /// `key`
    Exists,
    /// `!key`
    DoesNotExist,
}

/// One clause of a selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

impl Requirement {
    fn new(key: &str, operator: Operator, values: BTreeSet<String>) -> Result<Self, Error> {
        validate_key(key)?;
        for v in &values {
            validate_value(v)?;
        }
        match operator {
            Operator::Equals | Operator::NotEquals if values.len() != 1 => {
                return Err(Error::validation(format!(
                    "requirement on {:?} needs exactly one value",
                    key
                )));
            }
            Operator::In | Operator::NotIn if values.is_empty() => {
                return Err(Error::validation(format!(
                    "set requirement on {:?} needs at least one value",
                    key
                )));
            }
            Operator::Exists | Operator::DoesNotExist if !values.is_empty() => {
                return Err(Error::validation(format!(
                    "existence requirement on {:?} takes no values",
                    key
                )));
            }
            _ => {}
        }
        Ok(Self {
            key: key.to_string(),
            operator,
            values,
        })
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::Equals | Operator::In => value.is_some_and(|v| self.values.contains(v)),
            Operator::NotEquals | Operator::NotIn => value.map_or(true, |v| !self.values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

/// A conjunction of label requirements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// A selector that matches every label set
    pub fn everything() -> Self {
        Self::default()
    }

    /// Whether this selector has no requirements
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Whether the given labels satisfy every requirement
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    /// Parse the string form of a selector.
    ///
    /// An empty or whitespace-only expression yields [`Selector::everything`].
    pub fn parse(expr: &str) -> Result<Self, Error> {
        let mut requirements = Vec::new();
        for clause in split_clauses(expr)? {
            let clause = clause.trim();
            if clause.is_empty() {
                return Err(Error::validation(format!(
                    "empty clause in selector {:?}",
                    expr
                )));
            }
            requirements.push(parse_clause(clause)?);
        }
        Ok(Self { requirements })
    }

    /// Convert a structured `LabelSelector`.
    ///
    /// `None` is treated as an empty selector that matches everything, not as a
    /// selector that matches nothing.
    pub fn from_label_selector(selector: Option<&LabelSelector>) -> Result<Self, Error> {
        let Some(selector) = selector else {
            return Ok(Self::everything());
        };

        let mut requirements = Vec::new();
        if let Some(match_labels) = &selector.match_labels {
            for (key, value) in match_labels {
                requirements.push(Requirement::new(
                    key,
                    Operator::Equals,
                    BTreeSet::from([value.clone()]),
                )?);
            }
        }

        for expr in selector.match_expressions.iter().flatten() {
            let operator = match expr.operator.as_str() {
                "In" => Operator::In,
                "NotIn" => Operator::NotIn,
                "Exists" => Operator::Exists,
                "DoesNotExist" => Operator::DoesNotExist,
                other => {
                    return Err(Error::validation_for_field(
                        "matchExpressions.operator",
                        format!("{:?} is not a valid label selector operator", other),
                    ))
                }
            };
            let values = expr.values.iter().flatten().cloned().collect();
            requirements.push(Requirement::new(&expr.key, operator, values)?);
        }

        Ok(Self { requirements })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clauses: Vec<String> = self
            .requirements
            .iter()
            .map(|r| {
                let joined = || r.values.iter().cloned().collect::<Vec<_>>().join(",");
                match r.operator {
                    Operator::Equals => format!("{}={}", r.key, joined()),
                    Operator::NotEquals => format!("{}!={}", r.key, joined()),
                    Operator::In => format!("{} in ({})", r.key, joined()),
                    Operator::NotIn => format!("{} notin ({})", r.key, joined()),
                    Operator::Exists => r.key.clone(),
                    Operator::DoesNotExist => format!("!{}", r.key),
                }
            })
            .collect();
        write!(f, "{}", clauses.join(","))
    }
}

/// Split on top-level commas, leaving commas inside `( )` alone
fn split_clauses(expr: &str) -> Result<Vec<&str>, Error> {
    if expr.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in expr.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    Error::validation(format!("unbalanced parenthesis in selector {:?}", expr))
                })?
            }
            ',' if depth == 0 => {
                clauses.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(Error::validation(format!(
            "unbalanced parenthesis in selector {:?}",
            expr
        )));
    }
    clauses.push(&expr[start..]);
    Ok(clauses)
}

fn parse_clause(clause: &str) -> Result<Requirement, Error> {
    if let Some(key) = clause.strip_prefix('!') {
        return Requirement::new(key.trim(), Operator::DoesNotExist, BTreeSet::new());
    }

    if let Some((key, value)) = clause.split_once("!=") {
        return Requirement::new(key.trim(), Operator::NotEquals, single(value));
    }
    if let Some((key, value)) = clause.split_once("==") {
        return Requirement::new(key.trim(), Operator::Equals, single(value));
    }
    if let Some((key, value)) = clause.split_once('=') {
        return Requirement::new(key.trim(), Operator::Equals, single(value));
    }

    if let Some(open) = clause.find('(') {
        let head = clause[..open].trim();
        let close = clause
            .rfind(')')
            .filter(|close| *close > open && clause[close + 1..].trim().is_empty())
            .ok_or_else(|| Error::validation(format!("malformed set clause {:?}", clause)))?;
        let values = clause[open + 1..close]
            .split(',')
            .map(|v| v.trim().to_string())
            .collect();

        let (key, operator) = if let Some(key) = head.strip_suffix(" notin") {
            (key, Operator::NotIn)
        } else if let Some(key) = head.strip_suffix(" in") {
            (key, Operator::In)
        } else {
            return Err(Error::validation(format!(
                "unknown set operator in clause {:?}",
                clause
            )));
        };
        return Requirement::new(key.trim(), operator, values);
    }

    Requirement::new(clause, Operator::Exists, BTreeSet::new())
}

fn single(value: &str) -> BTreeSet<String> {
    BTreeSet::from([value.trim().to_string()])
}

fn validate_key(key: &str) -> Result<(), Error> {
    let valid = !key.is_empty()
        && key.len() <= 316
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid label key {:?}", key)))
    }
}

fn validate_value(value: &str) -> Result<(), Error> {
    let valid = value.len() <= 63
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid label value {:?}", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_matches_everything() {
        let s = Selector::parse("").unwrap();
        assert!(s.is_empty());
        assert!(s.matches(&labels(&[])));
        assert!(s.matches(&labels(&[("app", "web")])));
    }

    #[test]
    fn test_equality_clauses() {
        let s = Selector::parse("app=web,tier==frontend").unwrap();
        assert!(s.matches(&labels(&[("app", "web"), ("tier", "frontend")])));
        assert!(!s.matches(&labels(&[("app", "web")])));

        let s = Selector::parse("app!=web").unwrap();
        assert!(s.matches(&labels(&[])));
        assert!(s.matches(&labels(&[("app", "db")])));
        assert!(!s.matches(&labels(&[("app", "web")])));
    }

    #[test]
    fn test_set_clauses() {
        let s = Selector::parse("env in (prod, staging),team notin (ops)").unwrap();
        assert!(s.matches(&labels(&[("env", "prod")])));
        assert!(s.matches(&labels(&[("env", "staging"), ("team", "dev")])));
        assert!(!s.matches(&labels(&[("env", "prod"), ("team", "ops")])));
        assert!(!s.matches(&labels(&[("env", "dev")])));
    }

    #[test]
    fn test_existence_clauses() {
        let s = Selector::parse("backup,!legacy").unwrap();
        assert!(s.matches(&labels(&[("backup", "")])));
        assert!(!s.matches(&labels(&[("backup", "yes"), ("legacy", "true")])));
        assert!(!s.matches(&labels(&[])));
    }

    #[test]
    fn test_invalid_expressions() {
        assert!(Selector::parse("app in (a").is_err());
        assert!(Selector::parse("app=web,,tier=x").is_err());
        assert!(Selector::parse("app between (a,b)").is_err());
        assert!(Selector::parse("app=not valid").is_err());
        assert!(Selector::parse("=web").is_err());
    }

    #[test]
    fn test_display_round_trips() {
        let s = Selector::parse("app=web,env in (prod,staging),!legacy").unwrap();
        assert_eq!(Selector::parse(&s.to_string()).unwrap(), s);
    }

    #[test]
    fn test_none_label_selector_matches_everything() {
        let s = Selector::from_label_selector(None).unwrap();
        assert!(s.matches(&labels(&[("anything", "goes")])));

        let s = Selector::from_label_selector(Some(&LabelSelector::default())).unwrap();
        assert!(s.matches(&labels(&[])));
    }

    #[test]
    fn test_structured_label_selector() {
        let selector = LabelSelector {
            match_labels: Some(BTreeMap::from([("app".to_string(), "web".to_string())])),
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "env".to_string(),
                operator: "In".to_string(),
                values: Some(vec!["prod".to_string()]),
            }]),
        };
        let s = Selector::from_label_selector(Some(&selector)).unwrap();
        assert!(s.matches(&labels(&[("app", "web"), ("env", "prod")])));
        assert!(!s.matches(&labels(&[("app", "web"), ("env", "dev")])));
    }

    #[test]
    fn test_structured_label_selector_bad_operator() {
        let selector = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "env".to_string(),
                operator: "Gt".to_string(),
                values: None,
            }]),
        };
        let err = Selector::from_label_selector(Some(&selector)).unwrap_err();
        assert_eq!(err.field(), Some("matchExpressions.operator"));
    }
}
