//! Per-template sweep strategies.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scout_types::{HyperparameterAssignment, ParameterKind, ParameterValue};
use serde::{Deserialize, Serialize};

use crate::space::{TunableParam, TunableSpace};

/// Which strategy a template's arm uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Grid,
    Random,
    #[default]
    Bayesian,
}

impl StrategyKind {
    pub fn build(
        self,
        space: TunableSpace,
        seed: u64,
        exploration_weight: f64,
        grid_steps: usize,
    ) -> Box<dyn SearchStrategy> {
        match self {
            Self::Grid => Box::new(GridSearch::new(space, grid_steps)),
            Self::Random => Box::new(RandomSearch::new(space, seed)),
            Self::Bayesian => Box::new(BayesianSearch::new(space, exploration_weight, seed)),
        }
    }
}

/// Common trait for all search strategies.
pub trait SearchStrategy: Send + Sync {
    /// Generate the next batch of assignments to evaluate.
    fn suggest(&mut self, count: usize) -> Vec<HyperparameterAssignment>;

    /// Report completed evaluations so adaptive strategies can learn.
    fn report(&mut self, _params: &HyperparameterAssignment, _objective: f64) {}

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

fn sample_param(rng: &mut StdRng, kind: &ParameterKind) -> ParameterValue {
    match kind {
        ParameterKind::FloatRange { low, high } => {
            if low < high {
                ParameterValue::Float(rng.gen_range(*low..=*high))
            } else {
                ParameterValue::Float(*low)
            }
        }
        ParameterKind::IntRange { low, high } => {
            if low < high {
                ParameterValue::Int(rng.gen_range(*low..=*high))
            } else {
                ParameterValue::Int(*low)
            }
        }
        ParameterKind::LogUniform { low, high } => {
            if *low > 0.0 && low < high {
                let log_val: f64 = rng.gen_range(low.ln()..=high.ln());
                ParameterValue::Float(log_val.exp())
            } else {
                ParameterValue::Float(*low)
            }
        }
        ParameterKind::Choice { values } => {
            if values.is_empty() {
                ParameterValue::Json(serde_json::Value::Null)
            } else {
                let idx = rng.gen_range(0..values.len());
                ParameterValue::Json(values[idx].clone())
            }
        }
    }
}

fn sample_space(rng: &mut StdRng, space: &TunableSpace) -> HyperparameterAssignment {
    space
        .parameters
        .iter()
        .map(|p| (p.key.clone(), sample_param(rng, &p.kind)))
        .collect()
}

// ---- Grid search ----

/// Exhaustive grid search over discrete parameter combinations.
#[derive(Debug, Clone)]
pub struct GridSearch {
    cursor: usize,
    combos: Vec<HyperparameterAssignment>,
}

impl GridSearch {
    pub fn new(space: TunableSpace, float_steps: usize) -> Self {
        Self {
            cursor: 0,
            combos: Self::build_grid(&space, float_steps),
        }
    }

    fn axis(param: &TunableParam, float_steps: usize) -> Vec<ParameterValue> {
        let steps = float_steps.max(2);
        match &param.kind {
            ParameterKind::FloatRange { low, high } => (0..steps)
                .map(|i| {
                    let t = i as f64 / (steps - 1) as f64;
                    ParameterValue::Float(low + t * (high - low))
                })
                .collect(),
            ParameterKind::IntRange { low, high } => {
                let span = i128::from(*high) - i128::from(*low);
                if span < steps as i128 {
                    (*low..=*high).map(ParameterValue::Int).collect()
                } else {
                    // Evenly spaced, both ends included.
                    (0..steps)
                        .map(|i| {
                            let offset = span * i as i128 / (steps - 1) as i128;
                            ParameterValue::Int((i128::from(*low) + offset) as i64)
                        })
                        .collect()
                }
            }
            ParameterKind::LogUniform { low, high } => {
                let log_low = low.ln();
                let log_high = high.ln();
                (0..steps)
                    .map(|i| {
                        let t = i as f64 / (steps - 1) as f64;
                        ParameterValue::Float((log_low + t * (log_high - log_low)).exp())
                    })
                    .collect()
            }
            ParameterKind::Choice { values } => values
                .iter()
                .map(|v| ParameterValue::Json(v.clone()))
                .collect(),
        }
    }

    fn build_grid(space: &TunableSpace, float_steps: usize) -> Vec<HyperparameterAssignment> {
        // Cartesian product
        let mut result = vec![HyperparameterAssignment::new()];
        for param in &space.parameters {
            let axis = Self::axis(param, float_steps);
            let mut next = Vec::with_capacity(result.len() * axis.len());
            for existing in &result {
                for value in &axis {
                    let mut combo = existing.clone();
                    combo.insert(param.key.clone(), value.clone());
                    next.push(combo);
                }
            }
            result = next;
        }

        result
    }

    pub fn remaining(&self) -> usize {
        self.combos.len() - self.cursor
    }
}

impl SearchStrategy for GridSearch {
    fn suggest(&mut self, count: usize) -> Vec<HyperparameterAssignment> {
        let end = (self.cursor + count).min(self.combos.len());
        let batch = self.combos[self.cursor..end].to_vec();
        self.cursor = end;
        batch
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Random search ----

/// Independent random sampling across the space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: TunableSpace,
    rng: StdRng,
}

impl RandomSearch {
    pub fn new(space: TunableSpace, seed: u64) -> Self {
        Self {
            space,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<HyperparameterAssignment> {
        (0..count)
            .map(|_| sample_space(&mut self.rng, &self.space))
            .collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Bayesian search ----

/// Surrogate-guided search.
///
/// Tracks observed (assignment, objective) pairs and, with probability
/// `1 - exploration_weight`, perturbs the best observation instead of
/// sampling uniformly.
#[derive(Debug, Clone)]
pub struct BayesianSearch {
    space: TunableSpace,
    observations: Vec<(HyperparameterAssignment, f64)>,
    exploration_weight: f64,
    rng: StdRng,
}

impl BayesianSearch {
    pub fn new(space: TunableSpace, exploration_weight: f64, seed: u64) -> Self {
        Self {
            space,
            observations: Vec::new(),
            exploration_weight,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn exploit(&mut self) -> HyperparameterAssignment {
        let best = self
            .observations
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(params, _)| params.clone());

        let base = match best {
            Some(params) => params,
            None => return sample_space(&mut self.rng, &self.space),
        };

        let mut perturbed = HyperparameterAssignment::new();
        for param in &self.space.parameters {
            let base_val = base.get(param.key.step, &param.key.name);
            let value = match (&param.kind, base_val) {
                (ParameterKind::FloatRange { low, high }, Some(ParameterValue::Float(v))) => {
                    let noise = self.rng.gen_range(-0.1..0.1) * (high - low);
                    ParameterValue::Float((v + noise).max(*low).min(*high))
                }
                (ParameterKind::IntRange { low, high }, Some(ParameterValue::Int(v))) => {
                    let delta: i64 = self.rng.gen_range(-2..=2);
                    ParameterValue::Int((v + delta).clamp(*low, (*high).max(*low)))
                }
                (ParameterKind::LogUniform { low, high }, Some(ParameterValue::Float(v)))
                    if *v > 0.0 && *low > 0.0 =>
                {
                    let log_range = high.ln() - low.ln();
                    let noise = self.rng.gen_range(-0.1..0.1) * log_range;
                    ParameterValue::Float((v.ln() + noise).exp().max(*low).min(*high))
                }
                // Choices and missing base values are resampled.
                (kind, _) => sample_param(&mut self.rng, kind),
            };
            perturbed.insert(param.key.clone(), value);
        }

        perturbed
    }
}

impl SearchStrategy for BayesianSearch {
    fn suggest(&mut self, count: usize) -> Vec<HyperparameterAssignment> {
        (0..count)
            .map(|_| {
                if self.observations.is_empty() || self.rng.gen::<f64>() < self.exploration_weight
                {
                    sample_space(&mut self.rng, &self.space)
                } else {
                    self.exploit()
                }
            })
            .collect()
    }

    fn report(&mut self, params: &HyperparameterAssignment, objective: f64) {
        self.observations.push((params.clone(), objective));
    }

    fn name(&self) -> &str {
        "bayesian"
    }
}
