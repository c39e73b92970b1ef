//! Fixtures shared by the unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use scout_tuning::{Proposal, Tuner, TunerFactory};
use scout_types::{
    BoundStep, Candidate, DataModality, DatasetHandle, EvaluationError, HyperValue,
    HyperparameterAssignment, Metric, MetricSpec, ParameterKind, ParameterValue,
    PipelineDescription, Problem, ScoreOptions, StepTemplate, TaskType, Template, TuningError,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{CvReport, ScoringEngine};
use crate::session::StopHandle;

pub(crate) fn dataset() -> DatasetHandle {
    DatasetHandle::new("185_baseball", "file:///datasets/185_baseball", DataModality::SingleTable)
}

pub(crate) fn problem() -> Problem {
    Problem::new("185_baseball_problem", TaskType::Classification, "Multiclass").with_metric(Metric::Accuracy)
}

pub(crate) fn candidate_with(primitives: &[&str]) -> Candidate {
    let steps = primitives
        .iter()
        .map(|p| BoundStep {
            primitive: p.to_string(),
            arguments: BTreeMap::new(),
            outputs: vec!["produce".into()],
            hyperparams: BTreeMap::new(),
        })
        .collect();
    Candidate::new(
        "fixture",
        PipelineDescription {
            inputs: vec!["inputs".into()],
            steps,
            outputs: Vec::new(),
        },
    )
}

/// One-step template whose estimator reports its `quality` as every fold score.
pub(crate) fn quality_template(name: &str, default_quality: f64) -> Template {
    Template::new(name).with_input("inputs").with_step(
        StepTemplate::new(format!("{name}.estimator"))
            .with_tunable(
                "quality",
                HyperValue::Float(default_quality),
                ParameterKind::FloatRange { low: 0.0, high: 1.0 },
            )
            .with_output("produce"),
    )
}

/// Template whose every fold fails.
pub(crate) fn broken_template(name: &str) -> Template {
    Template::new(name).with_step(StepTemplate::new(format!("broken.{name}")).with_tunable(
        "quality",
        HyperValue::Float(0.5),
        ParameterKind::FloatRange { low: 0.0, high: 1.0 },
    ))
}

/// Engine returning the same report for everything.
pub(crate) struct StaticEngine {
    report: CvReport,
    calls: AtomicUsize,
}

impl StaticEngine {
    pub(crate) fn new(report: CvReport) -> Self {
        Self {
            report,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringEngine for StaticEngine {
    async fn cross_validate(
        &self,
        _dataset: &DatasetHandle,
        _problem: &Problem,
        _pipeline: &PipelineDescription,
        _metrics: &[MetricSpec],
        _options: &ScoreOptions,
    ) -> Result<CvReport, EvaluationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.report.clone())
    }
}

/// Engine driven by the candidate itself:
/// - primitives starting with `broken.` fail every fold
/// - a negative `quality` fails every fold
/// - primitives starting with `slow` sleep for `slow_delay` first
/// - otherwise each fold scores `quality`
#[derive(Default)]
pub(crate) struct QualityEngine {
    calls: AtomicUsize,
    slow_delay: Duration,
    finished: Mutex<Vec<String>>,
    stop_after: Mutex<Option<(usize, StopHandle)>>,
}

impl QualityEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_slow_delay(mut self, delay: Duration) -> Self {
        self.slow_delay = delay;
        self
    }

    /// Raise `handle` while the `call`-th evaluation (1-based) is running.
    pub(crate) fn stop_during(&self, call: usize, handle: StopHandle) {
        *self.stop_after.lock() = Some((call, handle));
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Primitives of evaluations that ran to completion, in order.
    pub(crate) fn finished(&self) -> Vec<String> {
        self.finished.lock().clone()
    }
}

#[async_trait]
impl ScoringEngine for QualityEngine {
    async fn cross_validate(
        &self,
        _dataset: &DatasetHandle,
        _problem: &Problem,
        pipeline: &PipelineDescription,
        _metrics: &[MetricSpec],
        options: &ScoreOptions,
    ) -> Result<CvReport, EvaluationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let pending_stop = self.stop_after.lock().clone();
        if let Some((at, handle)) = pending_stop {
            if at == call {
                handle.stop();
            }
        }

        let step = pipeline.steps.first().ok_or_else(|| EvaluationError::Engine {
            message: "empty pipeline".into(),
        })?;
        if step.primitive.starts_with("slow") {
            tokio::time::sleep(self.slow_delay).await;
        }
        self.finished.lock().push(step.primitive.clone());

        if step.primitive.starts_with("broken.") {
            return Ok(CvReport::failed("RuntimeError: estimator exploded"));
        }
        let quality = match step.hyperparams.get("quality") {
            Some(HyperValue::Float(q)) => *q,
            Some(HyperValue::Int(q)) => *q as f64,
            _ => 0.5,
        };
        if quality < 0.0 {
            return Ok(CvReport::failed("ValueError: negative quality"));
        }
        Ok(CvReport::scored(vec![quality; options.folds]))
    }
}

/// One scripted tuner proposal.
#[derive(Debug, Clone)]
pub(crate) struct ScriptStep {
    pub template: String,
    pub assignment: HyperparameterAssignment,
    pub is_default_phase: bool,
}

impl ScriptStep {
    pub(crate) fn defaults(template: &str) -> Self {
        Self {
            template: template.into(),
            assignment: HyperparameterAssignment::new(),
            is_default_phase: true,
        }
    }

    pub(crate) fn tuned(template: &str, quality: f64) -> Self {
        Self {
            template: template.into(),
            assignment: HyperparameterAssignment::new().with(0, "quality", ParameterValue::Float(quality)),
            is_default_phase: false,
        }
    }

    pub(crate) fn raw(template: &str, assignment: HyperparameterAssignment, is_default_phase: bool) -> Self {
        Self {
            template: template.into(),
            assignment,
            is_default_phase,
        }
    }
}

/// Builds tuners that replay a fixed script, then report exhaustion.
#[derive(Default)]
pub(crate) struct ScriptedTunerFactory {
    script: Vec<ScriptStep>,
    feedback: Arc<Mutex<Vec<(String, f64)>>>,
}

impl ScriptedTunerFactory {
    pub(crate) fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script,
            feedback: Arc::default(),
        }
    }

    /// Every `(template, normalized score)` the tuners were fed.
    pub(crate) fn feedback(&self) -> Arc<Mutex<Vec<(String, f64)>>> {
        Arc::clone(&self.feedback)
    }
}

impl TunerFactory for ScriptedTunerFactory {
    fn build(&self, roster: &[Arc<Template>]) -> Result<Box<dyn Tuner>, TuningError> {
        let steps = self
            .script
            .iter()
            .map(|step| {
                let template = roster
                    .iter()
                    .find(|t| t.name == step.template)
                    .cloned()
                    .ok_or_else(|| TuningError::UnknownTemplate {
                        name: step.template.clone(),
                    })?;
                Ok(Proposal {
                    template_name: step.template.clone(),
                    template,
                    assignment: step.assignment.clone(),
                    is_default_phase: step.is_default_phase,
                })
            })
            .collect::<Result<VecDeque<_>, TuningError>>()?;

        Ok(Box::new(ScriptedTuner {
            steps,
            feedback: Arc::clone(&self.feedback),
        }))
    }
}

struct ScriptedTuner {
    steps: VecDeque<Proposal>,
    feedback: Arc<Mutex<Vec<(String, f64)>>>,
}

impl Tuner for ScriptedTuner {
    fn propose(&mut self) -> Result<Proposal, TuningError> {
        self.steps.pop_front().ok_or(TuningError::Exhausted {
            template: "script".into(),
        })
    }

    fn add(&mut self, template_name: &str, _assignment: &HyperparameterAssignment, normalized_score: f64) {
        self.feedback.lock().push((template_name.to_string(), normalized_score));
    }
}
