//! # scout-tuning
//!
//! Hyperparameter proposal for Scout pipeline search.
//!
//! Provides tunable spaces derived from templates, per-template sweep
//! strategies (grid, random, Bayesian), and the roster-level [`Tuner`] that
//! decides which template to try next.

mod space;
mod strategy;
mod tuner;

pub use space::{TunableParam, TunableSpace};
pub use strategy::{BayesianSearch, GridSearch, RandomSearch, SearchStrategy, StrategyKind};
pub use tuner::{
    DefaultTunerFactory, Proposal, TemplateTuner, Tuner, TunerFactory, TunerSettings,
};
