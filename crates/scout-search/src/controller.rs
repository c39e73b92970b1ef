//! The search loop.

use crossbeam_channel::Sender;
use scout_tuning::{DefaultTunerFactory, Tuner, TunerFactory};
use scout_types::{
    Candidate, CandidateId, DataModality, DatasetHandle, EvaluationError, HyperparameterAssignment,
    MetricSpec, Problem, ScoutResult, SearchError, TaskType,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::builder::CandidateBuilder;
use crate::config::SearchConfig;
use crate::engine::ScoringEngine;
use crate::evaluator::Evaluator;
use crate::events::SearchEvent;
use crate::library::TemplateLibrary;
use crate::session::{HardDeadline, SearchSession, StopHandle, Termination};
use crate::store::ResultStore;

/// What a search call reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub best_pipeline_id: Option<CandidateId>,
    pub best_score: Option<f64>,
    pub best_normalized_score: Option<f64>,
    pub best_template_name: Option<String>,
    pub data_modality: DataModality,
    pub task_type: TaskType,
    pub task_subtype: String,
    /// Iterations beyond the first pass over the roster; `None` if there were none.
    pub completed_iterations: Option<usize>,
    pub error_messages: Option<Vec<String>>,
    pub termination: Termination,
    pub elapsed_secs: f64,
    /// Candidates written during this call, fallback included.
    pub candidates_persisted: usize,
}

/// Orchestrates one search at a time over a template library.
pub struct SearchController {
    config: SearchConfig,
    library: Arc<dyn TemplateLibrary>,
    evaluator: Evaluator,
    builder: CandidateBuilder,
    store: Arc<ResultStore>,
    tuner_factory: Box<dyn TunerFactory>,
    stop: StopHandle,
    events: Option<Sender<SearchEvent>>,
}

impl SearchController {
    pub fn new(
        config: SearchConfig,
        library: Arc<dyn TemplateLibrary>,
        engine: Arc<dyn ScoringEngine>,
    ) -> ScoutResult<Self> {
        config.validate()?;

        let store = ResultStore::new(&config.output_dir, config.materialize_leaderboard)?;
        let evaluator = match config.isolation.worker.clone() {
            Some(worker) => Evaluator::new(engine).with_isolation(config.isolation.denylist.clone(), worker),
            None => Evaluator::new(engine),
        };
        let tuner_factory = Box::new(DefaultTunerFactory::new(config.tuner.clone()));

        info!(
            output_dir = %config.output_dir.display(),
            fallback = %config.fallback_template,
            hard_deadline = config.hard_deadline,
            "Search controller ready"
        );

        Ok(Self {
            config,
            library,
            evaluator,
            builder: CandidateBuilder::new(),
            store: Arc::new(store),
            tuner_factory,
            stop: StopHandle::new(),
            events: None,
        })
    }

    pub fn with_tuner_factory<F>(mut self, factory: F) -> Self
    where
        F: TunerFactory + 'static,
    {
        self.tuner_factory = Box::new(factory);
        self
    }

    pub fn with_events(mut self, events: Sender<SearchEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<ResultStore> {
        Arc::clone(&self.store)
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Ask the running search to stop at its next checkpoint.
    pub fn stop(&self) {
        info!("Stop requested");
        self.stop.stop();
    }

    /// Run a search session.
    ///
    /// Only setup failures are returned as errors: an unroutable problem, an
    /// unknown template, a fallback that cannot be scored, or a tuner that
    /// cannot be built. Everything after the fallback ends in an outcome.
    pub async fn search(
        &self,
        dataset: &DatasetHandle,
        problem: &Problem,
        timeout: Option<Duration>,
        budget: Option<usize>,
        template_names: Option<Vec<String>>,
    ) -> Result<SearchOutcome, SearchError> {
        self.stop.reset();
        let persisted_before = self.store.stats().total();

        let roster = match template_names {
            Some(names) => names,
            None => self.config.routing.route(dataset.modality, problem.task_type)?,
        };
        if roster.is_empty() {
            return Err(SearchError::Config("template roster is empty".to_string()));
        }
        let templates = roster
            .iter()
            .map(|name| self.library.load(name))
            .collect::<Result<Vec<_>, _>>()?;

        let metric = self
            .config
            .scoring
            .metrics
            .as_ref()
            .and_then(|m| m.first())
            .or_else(|| problem.primary_metric())
            .cloned()
            .ok_or_else(|| SearchError::Config(format!("problem {} declares no metric", problem.id)))?;

        let mut tuner = self.tuner_factory.build(&templates)?;
        let mut session = SearchSession::new(roster.clone(), timeout, budget, self.stop.clone());

        info!(
            dataset = %dataset.id,
            modality = %dataset.modality,
            task_type = %problem.task_type,
            roster = ?roster,
            timeout = ?timeout,
            budget = ?budget,
            "Starting search"
        );
        self.emit(SearchEvent::SessionStarted {
            roster,
            timeout_secs: timeout.map(|t| t.as_secs_f64()),
            budget,
        });

        self.seed_with_fallback(&mut session, dataset, problem, &metric).await?;

        let hard_deadline = if self.config.hard_deadline {
            session.arm_hard_deadline()
        } else {
            None
        };

        let termination = match self
            .run_loop(
                &mut session,
                tuner.as_mut(),
                hard_deadline.as_ref(),
                dataset,
                problem,
                &metric,
                budget,
            )
            .await
        {
            Ok(termination) => termination,
            Err(SearchError::Escalated { messages }) => {
                error!(failures = messages.len(), "Search escalated: {}", messages.join("; "));
                Termination::Escalated
            }
            Err(e) => {
                error!(error = %e, "Search aborted");
                session.errors.push(e.to_string());
                Termination::Aborted
            }
        };
        drop(hard_deadline);

        let completed_iterations = session.completed_iterations();
        let best = session.best.as_ref();
        let outcome = SearchOutcome {
            best_pipeline_id: best.map(|b| b.candidate_id),
            best_score: best.and_then(|b| b.score),
            best_normalized_score: best.map(|b| b.normalized_score),
            best_template_name: best.map(|b| b.template_name.clone()),
            data_modality: dataset.modality,
            task_type: problem.task_type,
            task_subtype: problem.task_subtype.to_lowercase(),
            completed_iterations,
            error_messages: (!session.errors.is_empty()).then(|| session.errors.clone()),
            termination,
            elapsed_secs: session.elapsed().as_secs_f64(),
            candidates_persisted: self.store.stats().total().saturating_sub(persisted_before),
        };

        info!(
            termination = ?outcome.termination,
            iterations = session.iteration,
            best = ?outcome.best_pipeline_id,
            best_score = ?outcome.best_score,
            elapsed_secs = outcome.elapsed_secs,
            "Search finished"
        );
        self.emit(SearchEvent::SessionFinished {
            termination,
            completed_iterations,
            best_normalized_score: outcome.best_normalized_score,
        });

        Ok(outcome)
    }

    async fn seed_with_fallback(
        &self,
        session: &mut SearchSession,
        dataset: &DatasetHandle,
        problem: &Problem,
        metric: &MetricSpec,
    ) -> Result<(), SearchError> {
        let name = &self.config.fallback_template;
        let fallback_error = |message: String| {
            error!(template = %name, "Fallback failed: {message}");
            SearchError::Fallback {
                template: name.clone(),
                message,
            }
        };

        let template = self
            .library
            .load(name)
            .map_err(|e| fallback_error(e.to_string()))?;
        let mut candidate = self
            .builder
            .build(&template, &HyperparameterAssignment::new())
            .map_err(|e| fallback_error(e.to_string()))?;

        info!(candidate = %candidate.id, template = %name, "Scoring fallback");
        self.evaluate(dataset, problem, &mut candidate, metric)
            .await
            .map_err(|e| fallback_error(e.to_string()))?;

        self.persist(&mut candidate);
        self.report(session, &candidate, 0, false);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_loop(
        &self,
        session: &mut SearchSession,
        tuner: &mut dyn Tuner,
        hard_deadline: Option<&HardDeadline>,
        dataset: &DatasetHandle,
        problem: &Problem,
        metric: &MetricSpec,
        budget: Option<usize>,
    ) -> Result<Termination, SearchError> {
        loop {
            if budget.is_some_and(|b| session.iteration >= b) {
                return Ok(Termination::Completed);
            }
            if let Some(termination) = session.check_stop() {
                info!(iteration = session.iteration, reason = ?termination, "Stopping search");
                return Ok(termination);
            }

            let proposal = tuner.propose()?;
            session.iteration += 1;
            let iteration = session.iteration;

            let (mut candidate, failure) = match self.builder.build(&proposal.template, &proposal.assignment) {
                Ok(mut candidate) => {
                    info!(
                        iteration,
                        candidate = %candidate.id,
                        template = %proposal.template_name,
                        default_phase = proposal.is_default_phase,
                        "Scoring candidate\n{}",
                        proposal.assignment
                    );

                    let scoring = self.evaluate(dataset, problem, &mut candidate, metric);
                    let result = match hard_deadline {
                        Some(deadline) => tokio::select! {
                            result = scoring => result,
                            _ = deadline.fired() => {
                                warn!(iteration, "Deadline passed mid-evaluation, abandoning candidate");
                                return Ok(Termination::TimedOut);
                            }
                        },
                        None => scoring.await,
                    };

                    match result {
                        Ok(()) => (Some(candidate), None),
                        Err(e) => {
                            warn!(iteration, candidate = %candidate.id, error = %e, "Error scoring candidate");
                            candidate.mark_failed(e.to_string());
                            let message = e.to_string();
                            (Some(candidate), Some(message))
                        }
                    }
                }
                Err(e) => {
                    warn!(iteration, template = %proposal.template_name, error = %e, "Error building candidate");
                    (None, Some(e.to_string()))
                }
            };

            if let Some(message) = &failure {
                if proposal.is_default_phase {
                    let escalate =
                        session.record_failure(format!("{}: {message}", proposal.template_name));
                    if escalate {
                        return Err(SearchError::Escalated {
                            messages: session.errors.clone(),
                        });
                    }
                } else {
                    debug!(iteration, template = %proposal.template_name, "Tolerating tuned-phase failure");
                }
            }

            let normalized = candidate.as_ref().map_or(0.0, Candidate::normalized_or_zero);
            if let Some(candidate) = candidate.as_mut() {
                self.persist(candidate);
            }
            tuner.add(&proposal.template_name, &proposal.assignment, normalized);

            if let Some(candidate) = &candidate {
                self.report(session, candidate, iteration, failure.is_some());
            }
        }
    }

    /// Score and normalize.
    async fn evaluate(
        &self,
        dataset: &DatasetHandle,
        problem: &Problem,
        candidate: &mut Candidate,
        metric: &MetricSpec,
    ) -> Result<(), EvaluationError> {
        self.evaluator
            .score(dataset, problem, candidate, &self.config.scoring)
            .await?;
        if let Some(score) = candidate.score {
            candidate.set_normalized(metric.metric.normalize(score));
        }
        Ok(())
    }

    fn persist(&self, candidate: &mut Candidate) {
        if let Err(e) = self.store.persist(candidate) {
            warn!(candidate = %candidate.id, error = %e, "Error saving candidate");
        }
    }

    fn report(&self, session: &mut SearchSession, candidate: &Candidate, iteration: usize, failed: bool) {
        let normalized_score = candidate.normalized_or_zero();
        info!(
            candidate = %candidate.id,
            score = ?candidate.score,
            normalized_score,
            "Candidate evaluated"
        );
        self.emit(SearchEvent::CandidateEvaluated {
            candidate_id: candidate.id,
            template_name: candidate.template_name.clone(),
            iteration,
            normalized_score,
            failed,
        });

        if !failed && session.offer(candidate) {
            info!(
                candidate = %candidate.id,
                template = %candidate.template_name,
                normalized_score,
                "New best candidate"
            );
            self.emit(SearchEvent::NewBest {
                candidate_id: candidate.id,
                template_name: candidate.template_name.clone(),
                normalized_score,
            });
        }
    }

    fn emit(&self, event: SearchEvent) {
        if let Some(events) = &self.events {
            // Best-effort; a dropped receiver only loses progress updates.
            let _ = events.try_send(event);
        }
    }
}
