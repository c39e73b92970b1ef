//! Concrete pipelines bound to hyperparameter values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::template::{Argument, PipelineOutput};
use crate::value::HyperValue;

/// Unique candidate identifier.
pub type CandidateId = Uuid;

/// A step with every hyperparameter resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundStep {
    pub primitive: String,
    pub arguments: BTreeMap<String, Argument>,
    pub outputs: Vec<String>,
    pub hyperparams: BTreeMap<String, HyperValue>,
}

/// The step graph a candidate owns. This is what the scoring engine runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDescription {
    pub inputs: Vec<String>,
    pub steps: Vec<BoundStep>,
    pub outputs: Vec<PipelineOutput>,
}

impl PipelineDescription {
    pub fn primitives(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.primitive.as_str())
    }
}

/// Candidate lifecycle: built, then scored or failed, then persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateState {
    Built,
    Scored,
    Failed,
    Persisted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub template_name: String,
    pub pipeline: PipelineDescription,
    /// Per-fold cross-validation scores, in fold order.
    pub cv_scores: Vec<f64>,
    /// Mean of `cv_scores`; `None` until scored, and after a failure.
    pub score: Option<f64>,
    /// Metric-agnostic score in [0, 1], higher is better.
    pub normalized_score: Option<f64>,
    /// Leaderboard position key, lower is better.
    pub rank: Option<f64>,
    pub state: CandidateState,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Candidate {
    pub fn new(template_name: impl Into<String>, pipeline: PipelineDescription) -> Self {
        Self {
            id: Uuid::new_v4(),
            template_name: template_name.into(),
            pipeline,
            cv_scores: Vec::new(),
            score: None,
            normalized_score: None,
            rank: None,
            state: CandidateState::Built,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Record fold scores and their mean.
    pub fn record_scores(&mut self, cv_scores: Vec<f64>) {
        self.score = if cv_scores.is_empty() {
            None
        } else {
            Some(cv_scores.iter().sum::<f64>() / cv_scores.len() as f64)
        };
        self.cv_scores = cv_scores;
        self.state = CandidateState::Scored;
    }

    /// Set the normalized score, clamped into [0, 1]. Non-finite values map to 0.
    pub fn set_normalized(&mut self, normalized: f64) {
        let value = if normalized.is_finite() {
            normalized.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.normalized_score = Some(value);
    }

    /// Mark a tolerated evaluation failure.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.score = None;
        self.normalized_score = Some(0.0);
        self.state = CandidateState::Failed;
        self.error = Some(message.into());
    }

    pub fn mark_persisted(&mut self) {
        self.state = CandidateState::Persisted;
    }

    /// Whether evaluation has run, successfully or not.
    pub fn is_evaluated(&self) -> bool {
        self.normalized_score.is_some()
    }

    pub fn normalized_or_zero(&self) -> f64 {
        self.normalized_score.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_pipeline() -> PipelineDescription {
        PipelineDescription {
            inputs: vec!["inputs".into()],
            steps: Vec::new(),
            outputs: Vec::new(),
        }
    }

    #[test]
    fn candidate_lifecycle() {
        let mut candidate = Candidate::new("xgb", empty_pipeline());
        assert_eq!(candidate.state, CandidateState::Built);
        assert!(candidate.score.is_none());
        assert!(!candidate.is_evaluated());

        candidate.record_scores(vec![0.5, 0.7, 0.9]);
        assert_eq!(candidate.state, CandidateState::Scored);
        assert!((candidate.score.unwrap() - 0.7).abs() < 1e-12);

        candidate.set_normalized(0.7);
        assert!(candidate.is_evaluated());

        candidate.mark_persisted();
        assert_eq!(candidate.state, CandidateState::Persisted);
    }

    #[test]
    fn failure_zeroes_normalized_score() {
        let mut candidate = Candidate::new("xgb", empty_pipeline());
        candidate.mark_failed("boom");
        assert_eq!(candidate.state, CandidateState::Failed);
        assert_eq!(candidate.score, None);
        assert_eq!(candidate.normalized_score, Some(0.0));
        assert_eq!(candidate.error.as_deref(), Some("boom"));
    }

    #[test]
    fn normalized_score_is_clamped() {
        let mut candidate = Candidate::new("xgb", empty_pipeline());
        candidate.set_normalized(1.5);
        assert_eq!(candidate.normalized_score, Some(1.0));
        candidate.set_normalized(f64::NAN);
        assert_eq!(candidate.normalized_score, Some(0.0));
        candidate.set_normalized(-0.2);
        assert_eq!(candidate.normalized_score, Some(0.0));
    }

    #[test]
    fn fresh_candidates_get_distinct_ids() {
        let a = Candidate::new("xgb", empty_pipeline());
        let b = Candidate::new("xgb", empty_pipeline());
        assert_ne!(a.id, b.id);
    }
}
