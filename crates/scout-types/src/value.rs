//! Hyperparameter values: raw tuner output and the closed set a bound
//! pipeline may carry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// String a tuner may emit in place of a missing value.
pub const UNSET_SENTINEL: &str = "None";

/// Describes how a tunable hyperparameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
    /// Categorical choices.
    Choice { values: Vec<serde_json::Value> },
}

/// A concrete value produced by a tuning strategy.
///
/// Strategies are free to hand back loosely typed JSON; nothing of this type
/// reaches a bound pipeline without going through [`HyperValue::normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
    Json(serde_json::Value),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// Value bound to a pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HyperValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Seq(Vec<HyperValue>),
    Absent,
}

impl HyperValue {
    /// Normalize a tuner value into the closed variant.
    pub fn normalize(value: &ParameterValue) -> Result<Self, String> {
        match value {
            ParameterValue::Int(v) => Ok(Self::Int(*v)),
            ParameterValue::Float(v) => Ok(Self::Float(*v)),
            ParameterValue::Json(v) => Self::from_json(v),
        }
    }

    /// Convert a JSON value, rejecting mappings.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, String> {
        use serde_json::Value;

        match value {
            Value::Null => Ok(Self::Absent),
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(format!("number {n} is not representable"))
                }
            }
            Value::String(s) if s == UNSET_SENTINEL => Ok(Self::Absent),
            Value::String(s) => Ok(Self::Str(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Seq),
            Value::Object(_) => Err("mapping values are not supported".to_string()),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// The tuner-side view of this value.
    pub fn to_parameter_value(&self) -> ParameterValue {
        match self {
            Self::Int(v) => ParameterValue::Int(*v),
            Self::Float(v) => ParameterValue::Float(*v),
            other => ParameterValue::Json(other.to_json()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Self::Int(v) => Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Bool(v) => Value::Bool(*v),
            Self::Str(v) => Value::String(v.clone()),
            Self::Seq(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Absent => Value::Null,
        }
    }
}

impl fmt::Display for HyperValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::Seq(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Absent => write!(f, "absent"),
        }
    }
}

/// Address of one hyperparameter inside a template: step index plus name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StepParam {
    pub step: usize,
    pub name: String,
}

impl StepParam {
    pub fn new(step: usize, name: impl Into<String>) -> Self {
        Self {
            step,
            name: name.into(),
        }
    }
}

impl fmt::Display for StepParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.step, self.name)
    }
}

/// Hyperparameter values proposed for one template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HyperparameterAssignment {
    values: BTreeMap<StepParam, ParameterValue>,
}

impl HyperparameterAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, step: usize, name: impl Into<String>, value: ParameterValue) -> Self {
        self.insert(StepParam::new(step, name), value);
        self
    }

    pub fn insert(&mut self, key: StepParam, value: ParameterValue) {
        self.values.insert(key, value);
    }

    pub fn get(&self, step: usize, name: &str) -> Option<&ParameterValue> {
        self.values.get(&StepParam::new(step, name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StepParam, &ParameterValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(StepParam, ParameterValue)> for HyperparameterAssignment {
    fn from_iter<I: IntoIterator<Item = (StepParam, ParameterValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for HyperparameterAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.values.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{key}: {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_numbers_without_boxing() {
        assert_eq!(HyperValue::normalize(&ParameterValue::Int(7)), Ok(HyperValue::Int(7)));
        assert_eq!(
            HyperValue::normalize(&ParameterValue::Json(json!(0.25))),
            Ok(HyperValue::Float(0.25))
        );
        assert_eq!(
            HyperValue::normalize(&ParameterValue::Json(json!(12))),
            Ok(HyperValue::Int(12))
        );
    }

    #[test]
    fn unset_sentinel_becomes_absent() {
        assert_eq!(
            HyperValue::normalize(&ParameterValue::Json(json!("None"))),
            Ok(HyperValue::Absent)
        );
        assert_eq!(
            HyperValue::normalize(&ParameterValue::Json(json!(null))),
            Ok(HyperValue::Absent)
        );
        assert_eq!(
            HyperValue::normalize(&ParameterValue::Json(json!("gini"))),
            Ok(HyperValue::Str("gini".into()))
        );
    }

    #[test]
    fn sequences_normalize_recursively() {
        let value = ParameterValue::Json(json!([1, 2.5, true, "None"]));
        assert_eq!(
            HyperValue::normalize(&value),
            Ok(HyperValue::Seq(vec![
                HyperValue::Int(1),
                HyperValue::Float(2.5),
                HyperValue::Bool(true),
                HyperValue::Absent,
            ]))
        );
    }

    #[test]
    fn mappings_are_rejected() {
        let value = ParameterValue::Json(json!({"a": 1}));
        assert!(HyperValue::normalize(&value).is_err());
    }

    #[test]
    fn hyper_values_serialize_as_plain_json() {
        let value = HyperValue::Seq(vec![HyperValue::Int(3), HyperValue::Absent]);
        assert_eq!(serde_json::to_value(&value).unwrap(), json!([3, null]));

        let back: HyperValue = serde_json::from_value(json!(0.5)).unwrap();
        assert_eq!(back, HyperValue::Float(0.5));
        let back: HyperValue = serde_json::from_value(json!(4)).unwrap();
        assert_eq!(back, HyperValue::Int(4));
    }

    #[test]
    fn assignment_lookup_and_display() {
        let assignment = HyperparameterAssignment::new()
            .with(1, "max_depth", ParameterValue::Int(6))
            .with(0, "strategy", ParameterValue::Json(json!("mean")));

        assert_eq!(assignment.len(), 2);
        assert_eq!(assignment.get(1, "max_depth"), Some(&ParameterValue::Int(6)));
        assert!(assignment.get(0, "max_depth").is_none());
        assert_eq!(assignment.to_string(), "0.strategy: \"mean\"\n1.max_depth: 6");
    }
}
