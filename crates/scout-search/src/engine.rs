use async_trait::async_trait;
use scout_types::{DatasetHandle, EvaluationError, MetricSpec, PipelineDescription, Problem, ScoreOptions};
use serde::{Deserialize, Serialize};

/// Per-fold outcome of one cross-validation run.
///
/// A fold either contributes a score or an error message; the two lists are
/// independent and either may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvReport {
    pub fold_scores: Vec<f64>,
    #[serde(default)]
    pub fold_errors: Vec<String>,
}

impl CvReport {
    pub fn scored(fold_scores: Vec<f64>) -> Self {
        Self {
            fold_scores,
            fold_errors: Vec::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            fold_scores: Vec::new(),
            fold_errors: vec![error.into()],
        }
    }
}

/// The cross-validation backend that actually fits and scores pipelines.
#[async_trait]
pub trait ScoringEngine: Send + Sync {
    /// Fit and score `pipeline` on each fold of `dataset`.
    ///
    /// Fold-level failures belong in [`CvReport::fold_errors`]. An `Err` is
    /// reserved for failures of the engine itself.
    async fn cross_validate(
        &self,
        dataset: &DatasetHandle,
        problem: &Problem,
        pipeline: &PipelineDescription,
        metrics: &[MetricSpec],
        options: &ScoreOptions,
    ) -> Result<CvReport, EvaluationError>;
}
