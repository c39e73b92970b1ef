//! Tunable hyperparameter spaces.

use scout_types::{HyperparameterAssignment, ParameterKind, StepParam, Template};
use serde::{Deserialize, Serialize};

/// A single tunable dimension, addressed by step and name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunableParam {
    pub key: StepParam,
    pub kind: ParameterKind,
}

/// The full space of a template: an ordered list of tunable dimensions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TunableSpace {
    pub parameters: Vec<TunableParam>,
}

impl TunableSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every ranged hyperparameter the template declares.
    pub fn from_template(template: &Template) -> Self {
        Self {
            parameters: template
                .tunables()
                .into_iter()
                .map(|(key, kind)| TunableParam { key, kind })
                .collect(),
        }
    }

    pub fn add(mut self, step: usize, name: impl Into<String>, kind: ParameterKind) -> Self {
        self.parameters.push(TunableParam {
            key: StepParam::new(step, name),
            kind,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Number of distinct discrete combinations (`None` if any parameter is
    /// continuous). Grid search caps wide integer axes below this.
    pub fn grid_size(&self) -> Option<usize> {
        let mut total: usize = 1;
        for param in &self.parameters {
            let dim_size = match &param.kind {
                ParameterKind::IntRange { low, high } => (high - low + 1).max(0) as usize,
                ParameterKind::Choice { values } => values.len(),
                _ => return None,
            };
            total = total.checked_mul(dim_size)?;
        }
        Some(total)
    }

    /// The template's declared defaults for every tunable dimension.
    pub fn defaults(&self, template: &Template) -> HyperparameterAssignment {
        self.parameters
            .iter()
            .filter_map(|p| {
                template
                    .default_value(p.key.step, &p.key.name)
                    .map(|v| (p.key.clone(), v.to_parameter_value()))
            })
            .collect()
    }
}
