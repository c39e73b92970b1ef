//! Scores candidates, in-process or in an isolated worker.

use scout_types::{Candidate, DatasetHandle, EvaluationError, MetricSpec, Problem, ScoreOptions};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::{CvReport, ScoringEngine};
use crate::worker::{WorkerCommand, WorkerRequest};

/// Evaluator adapter in front of a [`ScoringEngine`].
///
/// Candidates using any denylisted primitive are scored through the worker
/// command instead of in-process, so a native crash cannot take the search
/// down with it.
pub struct Evaluator {
    engine: Arc<dyn ScoringEngine>,
    denylist: HashSet<String>,
    worker: Option<WorkerCommand>,
}

impl Evaluator {
    pub fn new(engine: Arc<dyn ScoringEngine>) -> Self {
        Self {
            engine,
            denylist: HashSet::new(),
            worker: None,
        }
    }

    pub fn with_isolation<I, S>(mut self, denylist: I, worker: WorkerCommand) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.denylist = denylist.into_iter().map(Into::into).collect();
        self.worker = Some(worker);
        self
    }

    pub fn requires_isolation(&self, candidate: &Candidate) -> bool {
        self.worker.is_some()
            && candidate
                .pipeline
                .primitives()
                .any(|primitive| self.denylist.contains(primitive))
    }

    /// Cross-validate `candidate` and record its fold scores and mean.
    ///
    /// Fails with the first fold's root cause when no fold scored. The
    /// candidate is left untouched on failure.
    pub async fn score(
        &self,
        dataset: &DatasetHandle,
        problem: &Problem,
        candidate: &mut Candidate,
        options: &ScoreOptions,
    ) -> Result<(), EvaluationError> {
        let metrics: Vec<MetricSpec> = options
            .metrics
            .clone()
            .unwrap_or_else(|| problem.metrics.clone());

        let report = match self.worker.as_ref().filter(|_| self.requires_isolation(candidate)) {
            Some(worker) => {
                info!(candidate = %candidate.id, "Scoring candidate in isolated worker");
                let request = WorkerRequest {
                    candidate_id: candidate.id,
                    dataset: dataset.clone(),
                    problem: problem.clone(),
                    pipeline: candidate.pipeline.clone(),
                    metrics,
                    options: options.clone(),
                };
                worker.run(&request).await?
            }
            None => {
                debug!(candidate = %candidate.id, "Scoring candidate in-process");
                self.engine
                    .cross_validate(dataset, problem, &candidate.pipeline, &metrics, options)
                    .await?
            }
        };

        let CvReport {
            fold_scores,
            fold_errors,
        } = report;

        if fold_scores.is_empty() {
            let message = fold_errors
                .into_iter()
                .next()
                .unwrap_or_else(|| "no folds were scored".to_string());
            return Err(EvaluationError::Scoring { message });
        }

        if !fold_errors.is_empty() {
            warn!(
                candidate = %candidate.id,
                failed_folds = fold_errors.len(),
                scored_folds = fold_scores.len(),
                "Some folds failed, scoring on the rest"
            );
        }

        candidate.record_scores(fold_scores);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{candidate_with, dataset, problem, StaticEngine};
    use scout_types::CandidateState;

    #[tokio::test]
    async fn records_mean_of_fold_scores() {
        let engine = Arc::new(StaticEngine::new(CvReport::scored(vec![0.6, 0.8, 1.0])));
        let evaluator = Evaluator::new(engine.clone());
        let mut candidate = candidate_with(&["sklearn.ensemble.RandomForestClassifier"]);

        evaluator
            .score(&dataset(), &problem(), &mut candidate, &ScoreOptions::default())
            .await
            .unwrap();

        assert_eq!(candidate.state, CandidateState::Scored);
        assert_eq!(candidate.cv_scores, vec![0.6, 0.8, 1.0]);
        assert!((candidate.score.unwrap() - 0.8).abs() < 1e-12);
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn zero_successful_folds_surface_root_cause() {
        let report = CvReport {
            fold_scores: Vec::new(),
            fold_errors: vec![
                "ValueError: Input contains NaN".into(),
                "ValueError: Input contains NaN (fold 2)".into(),
            ],
        };
        let evaluator = Evaluator::new(Arc::new(StaticEngine::new(report)));
        let mut candidate = candidate_with(&["xgboost.XGBClassifier"]);

        let error = evaluator
            .score(&dataset(), &problem(), &mut candidate, &ScoreOptions::default())
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "ValueError: Input contains NaN");
        assert_eq!(candidate.state, CandidateState::Built);
        assert!(candidate.score.is_none());
    }

    #[tokio::test]
    async fn partial_fold_failures_still_score() {
        let report = CvReport {
            fold_scores: vec![0.4],
            fold_errors: vec!["fold 1 failed".into()],
        };
        let evaluator = Evaluator::new(Arc::new(StaticEngine::new(report)));
        let mut candidate = candidate_with(&["xgboost.XGBClassifier"]);

        evaluator
            .score(&dataset(), &problem(), &mut candidate, &ScoreOptions::default())
            .await
            .unwrap();
        assert_eq!(candidate.score, Some(0.4));
    }

    #[test]
    fn isolation_needs_a_denylisted_primitive_and_a_worker() {
        let engine: Arc<dyn ScoringEngine> = Arc::new(StaticEngine::new(CvReport::default()));
        let risky = candidate_with(&["impute", "lightgbm.LGBMClassifier"]);
        let safe = candidate_with(&["impute", "xgboost.XGBClassifier"]);

        let plain = Evaluator::new(engine.clone());
        assert!(!plain.requires_isolation(&risky));

        let isolated = Evaluator::new(engine)
            .with_isolation(["lightgbm.LGBMClassifier"], WorkerCommand::new("scout-worker"));
        assert!(isolated.requires_isolation(&risky));
        assert!(!isolated.requires_isolation(&safe));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn worker_crash_leaves_candidate_unscored() {
        let engine = Arc::new(StaticEngine::new(CvReport::scored(vec![1.0])));
        let worker = WorkerCommand::new("sh").with_args(["-c", "cat > /dev/null; kill -KILL $$"]);
        let evaluator = Evaluator::new(engine.clone()).with_isolation(["lightgbm.LGBMClassifier"], worker);
        let mut candidate = candidate_with(&["lightgbm.LGBMClassifier"]);

        let error = evaluator
            .score(&dataset(), &problem(), &mut candidate, &ScoreOptions::default())
            .await
            .unwrap_err();

        assert!(error.is_crash());
        assert!(candidate.score.is_none());
        assert_eq!(engine.calls(), 0);
    }
}
