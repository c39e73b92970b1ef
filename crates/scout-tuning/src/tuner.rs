//! Roster-level tuning: which template to try next, and with what values.

use scout_types::{HyperparameterAssignment, Template, TuningError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::space::TunableSpace;
use crate::strategy::{SearchStrategy, StrategyKind};

/// One proposal handed to the search loop.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub template_name: String,
    pub template: Arc<Template>,
    pub assignment: HyperparameterAssignment,
    /// True while the tuner is still trying each template's defaults.
    pub is_default_phase: bool,
}

/// Proposes (template, hyperparameters) and learns from normalized scores.
pub trait Tuner: Send {
    fn propose(&mut self) -> Result<Proposal, TuningError>;

    fn add(
        &mut self,
        template_name: &str,
        assignment: &HyperparameterAssignment,
        normalized_score: f64,
    );
}

/// Builds a fresh tuner for each search session.
pub trait TunerFactory: Send + Sync {
    fn build(&self, roster: &[Arc<Template>]) -> Result<Box<dyn Tuner>, TuningError>;
}

/// Settings for [`TemplateTuner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerSettings {
    pub strategy: StrategyKind,
    /// Exploration weight for Bayesian search (ignored for grid/random).
    pub exploration_weight: f64,
    /// UCB1 exploration constant used to pick templates.
    pub ucb_exploration: f64,
    /// Number of steps per continuous dimension for grid search.
    pub grid_steps: usize,
    pub seed: u64,
}

impl Default for TunerSettings {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Bayesian,
            exploration_weight: 0.3,
            ucb_exploration: std::f64::consts::SQRT_2,
            grid_steps: 5,
            seed: 0,
        }
    }
}

struct Arm {
    template: Arc<Template>,
    strategy: Box<dyn SearchStrategy>,
    defaults: HyperparameterAssignment,
    scores: Vec<f64>,
    exhausted: bool,
}

impl Arm {
    fn mean(&self) -> f64 {
        if self.scores.is_empty() {
            0.0
        } else {
            self.scores.iter().sum::<f64>() / self.scores.len() as f64
        }
    }
}

/// Default tuner: every template's defaults first, in roster order, then UCB1
/// over templates with a per-template strategy proposing values.
pub struct TemplateTuner {
    arms: Vec<Arm>,
    next_default: usize,
    ucb_exploration: f64,
}

impl TemplateTuner {
    pub fn new(roster: &[Arc<Template>], settings: &TunerSettings) -> Result<Self, TuningError> {
        if roster.is_empty() {
            return Err(TuningError::EmptyRoster);
        }

        let arms = roster
            .iter()
            .enumerate()
            .map(|(i, template)| {
                let space = TunableSpace::from_template(template);
                let defaults = space.defaults(template);
                let strategy = settings.strategy.build(
                    space,
                    settings.seed.wrapping_add(i as u64),
                    settings.exploration_weight,
                    settings.grid_steps,
                );
                Arm {
                    template: Arc::clone(template),
                    strategy,
                    defaults,
                    scores: Vec::new(),
                    exhausted: false,
                }
            })
            .collect();

        Ok(Self {
            arms,
            next_default: 0,
            ucb_exploration: settings.ucb_exploration,
        })
    }

    /// Whether every template's defaults have been proposed.
    pub fn defaults_done(&self) -> bool {
        self.next_default >= self.arms.len()
    }

    /// Number of scores received for a template.
    pub fn observations(&self, template_name: &str) -> usize {
        self.arms
            .iter()
            .find(|a| a.template.name == template_name)
            .map_or(0, |a| a.scores.len())
    }

    fn select(&self) -> Option<usize> {
        let total: usize = self.arms.iter().map(|a| a.scores.len()).sum();
        let log_total = (total.max(1) as f64).ln();

        let mut best: Option<(usize, f64)> = None;
        for (i, arm) in self.arms.iter().enumerate() {
            if arm.exhausted {
                continue;
            }
            let value = if arm.scores.is_empty() {
                f64::INFINITY
            } else {
                arm.mean() + self.ucb_exploration * (log_total / arm.scores.len() as f64).sqrt()
            };
            if best.map_or(true, |(_, v)| value > v) {
                best = Some((i, value));
            }
        }
        best.map(|(i, _)| i)
    }
}

impl Tuner for TemplateTuner {
    fn propose(&mut self) -> Result<Proposal, TuningError> {
        if let Some(arm) = self.arms.get(self.next_default) {
            self.next_default += 1;
            return Ok(Proposal {
                template_name: arm.template.name.clone(),
                template: Arc::clone(&arm.template),
                assignment: arm.defaults.clone(),
                is_default_phase: true,
            });
        }

        loop {
            let index = self.select().ok_or_else(|| TuningError::Exhausted {
                template: self
                    .arms
                    .iter()
                    .map(|a| a.template.name.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            })?;

            let arm = &mut self.arms[index];
            match arm.strategy.suggest(1).pop() {
                Some(assignment) => {
                    return Ok(Proposal {
                        template_name: arm.template.name.clone(),
                        template: Arc::clone(&arm.template),
                        assignment,
                        is_default_phase: false,
                    })
                }
                None => {
                    debug!(template = %arm.template.name, strategy = arm.strategy.name(), "search space exhausted");
                    arm.exhausted = true;
                }
            }
        }
    }

    fn add(
        &mut self,
        template_name: &str,
        assignment: &HyperparameterAssignment,
        normalized_score: f64,
    ) {
        match self.arms.iter_mut().find(|a| a.template.name == template_name) {
            Some(arm) => {
                arm.scores.push(normalized_score);
                arm.strategy.report(assignment, normalized_score);
            }
            None => warn!(template = %template_name, "score reported for unknown template"),
        }
    }
}

/// Builds a [`TemplateTuner`] from [`TunerSettings`].
#[derive(Debug, Clone, Default)]
pub struct DefaultTunerFactory {
    pub settings: TunerSettings,
}

impl DefaultTunerFactory {
    pub fn new(settings: TunerSettings) -> Self {
        Self { settings }
    }
}

impl TunerFactory for DefaultTunerFactory {
    fn build(&self, roster: &[Arc<Template>]) -> Result<Box<dyn Tuner>, TuningError> {
        Ok(Box::new(TemplateTuner::new(roster, &self.settings)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_types::{HyperValue, ParameterKind, ParameterValue, StepTemplate};

    fn template(name: &str) -> Arc<Template> {
        Arc::new(
            Template::new(name).with_step(StepTemplate::new(format!("{name}.estimator")).with_tunable(
                "depth",
                HyperValue::Int(3),
                ParameterKind::IntRange { low: 1, high: 8 },
            )),
        )
    }

    fn roster() -> Vec<Arc<Template>> {
        vec![template("a"), template("b"), template("c")]
    }

    #[test]
    fn empty_roster_is_rejected() {
        assert_eq!(
            TemplateTuner::new(&[], &TunerSettings::default()).err(),
            Some(TuningError::EmptyRoster)
        );
    }

    #[test]
    fn defaults_are_proposed_first_in_roster_order() {
        let mut tuner = TemplateTuner::new(&roster(), &TunerSettings::default()).unwrap();

        for name in ["a", "b", "c"] {
            let proposal = tuner.propose().unwrap();
            assert_eq!(proposal.template_name, name);
            assert!(proposal.is_default_phase);
            assert_eq!(proposal.assignment.get(0, "depth"), Some(&ParameterValue::Int(3)));
        }
        assert!(tuner.defaults_done());

        let proposal = tuner.propose().unwrap();
        assert!(!proposal.is_default_phase);
    }

    #[test]
    fn ucb_prefers_the_stronger_template() {
        let settings = TunerSettings {
            ucb_exploration: 0.0,
            ..TunerSettings::default()
        };
        let mut tuner = TemplateTuner::new(&roster(), &settings).unwrap();
        for score in [0.2, 0.9, 0.4] {
            let proposal = tuner.propose().unwrap();
            tuner.add(&proposal.template_name, &proposal.assignment, score);
        }

        for _ in 0..5 {
            let proposal = tuner.propose().unwrap();
            assert_eq!(proposal.template_name, "b");
            tuner.add(&proposal.template_name, &proposal.assignment, 0.9);
        }
        assert_eq!(tuner.observations("b"), 6);
    }

    #[test]
    fn exhausted_grids_fall_through_then_error() {
        let settings = TunerSettings {
            strategy: StrategyKind::Grid,
            ..TunerSettings::default()
        };
        let single = vec![Arc::new(Template::new("fixed").with_step(StepTemplate::new("p")))];
        let mut tuner = TemplateTuner::new(&single, &settings).unwrap();

        assert!(tuner.propose().unwrap().is_default_phase);
        // An empty space has exactly one grid point.
        assert!(!tuner.propose().unwrap().is_default_phase);
        assert!(matches!(tuner.propose(), Err(TuningError::Exhausted { .. })));
    }

    #[test]
    fn factory_builds_boxed_tuner() {
        let factory = DefaultTunerFactory::default();
        let mut tuner = factory.build(&roster()).unwrap();
        assert_eq!(tuner.propose().unwrap().template_name, "a");
    }
}
