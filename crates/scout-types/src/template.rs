use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value::{HyperValue, ParameterKind, StepParam};

/// Where a step argument takes its data from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentKind {
    Container,
    Data,
    Value,
}

/// A fixed step argument, e.g. `inputs <- steps.0.produce`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub kind: ArgumentKind,
    pub data: String,
}

/// A hyperparameter declared by a template step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameter {
    pub default: HyperValue,
    /// Search range; `None` means the value is fixed at its default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ParameterKind>,
}

/// One step of a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub primitive: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, Argument>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub hyperparams: BTreeMap<String, Hyperparameter>,
}

impl StepTemplate {
    pub fn new(primitive: impl Into<String>) -> Self {
        Self {
            primitive: primitive.into(),
            arguments: BTreeMap::new(),
            outputs: Vec::new(),
            hyperparams: BTreeMap::new(),
        }
    }

    pub fn with_argument(
        mut self,
        name: impl Into<String>,
        kind: ArgumentKind,
        data: impl Into<String>,
    ) -> Self {
        self.arguments.insert(
            name.into(),
            Argument {
                kind,
                data: data.into(),
            },
        );
        self
    }

    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    /// Declare a hyperparameter that is never tuned.
    pub fn with_fixed(mut self, name: impl Into<String>, default: HyperValue) -> Self {
        self.hyperparams.insert(
            name.into(),
            Hyperparameter {
                default,
                range: None,
            },
        );
        self
    }

    /// Declare a tunable hyperparameter with its default and search range.
    pub fn with_tunable(
        mut self,
        name: impl Into<String>,
        default: HyperValue,
        range: ParameterKind,
    ) -> Self {
        self.hyperparams.insert(
            name.into(),
            Hyperparameter {
                default,
                range: Some(range),
            },
        );
        self
    }
}

/// A named pipeline output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub name: String,
    pub data: String,
}

/// Immutable pipeline skeleton. Candidates are built from it, never by
/// mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub steps: Vec<StepTemplate>,
    #[serde(default)]
    pub outputs: Vec<PipelineOutput>,
}

impl Template {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            steps: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    pub fn with_step(mut self, step: StepTemplate) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, data: impl Into<String>) -> Self {
        self.outputs.push(PipelineOutput {
            name: name.into(),
            data: data.into(),
        });
        self
    }

    /// Primitive identifiers in step order.
    pub fn primitives(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.primitive.as_str())
    }

    /// Every hyperparameter that declares a search range.
    pub fn tunables(&self) -> Vec<(StepParam, ParameterKind)> {
        self.steps
            .iter()
            .enumerate()
            .flat_map(|(index, step)| {
                step.hyperparams.iter().filter_map(move |(name, hp)| {
                    hp.range
                        .clone()
                        .map(|range| (StepParam::new(index, name.clone()), range))
                })
            })
            .collect()
    }

    pub fn default_value(&self, step: usize, name: &str) -> Option<&HyperValue> {
        self.steps
            .get(step)?
            .hyperparams
            .get(name)
            .map(|hp| &hp.default)
    }
}
