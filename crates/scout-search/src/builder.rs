//! Binds tuner proposals onto templates.

use scout_types::{
    BoundStep, BuildError, Candidate, HyperValue, HyperparameterAssignment, PipelineDescription,
    Template,
};
use std::collections::BTreeMap;

/// Produces fresh candidates from a template and a proposal.
///
/// The template is only read; every candidate owns its own copy of the step
/// graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateBuilder;

impl CandidateBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(
        &self,
        template: &Template,
        proposal: &HyperparameterAssignment,
    ) -> Result<Candidate, BuildError> {
        for (key, _) in proposal.iter() {
            let step = template.steps.get(key.step).ok_or(BuildError::UnknownStep {
                step: key.step,
                steps: template.steps.len(),
            })?;
            if !step.hyperparams.contains_key(&key.name) {
                return Err(BuildError::UnknownHyperparameter {
                    step: key.step,
                    name: key.name.clone(),
                });
            }
        }

        let steps = template
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let hyperparams = step
                    .hyperparams
                    .iter()
                    .map(|(name, declared)| {
                        let value = match proposal.get(index, name) {
                            Some(raw) => HyperValue::normalize(raw).map_err(|reason| {
                                BuildError::UnsupportedValue {
                                    step: index,
                                    name: name.clone(),
                                    reason,
                                }
                            })?,
                            None => declared.default.clone(),
                        };
                        Ok((name.clone(), value))
                    })
                    .collect::<Result<BTreeMap<_, _>, BuildError>>()?;

                Ok(BoundStep {
                    primitive: step.primitive.clone(),
                    arguments: step.arguments.clone(),
                    outputs: step.outputs.clone(),
                    hyperparams,
                })
            })
            .collect::<Result<Vec<_>, BuildError>>()?;

        let pipeline = PipelineDescription {
            inputs: template.inputs.clone(),
            steps,
            outputs: template.outputs.clone(),
        };

        Ok(Candidate::new(&template.name, pipeline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_types::{ArgumentKind, CandidateState, ParameterKind, ParameterValue, StepTemplate};
    use serde_json::json;

    fn template() -> Template {
        Template::new("xgb_classification")
            .with_input("inputs")
            .with_step(
                StepTemplate::new("impute.SimpleImputer")
                    .with_argument("inputs", ArgumentKind::Container, "inputs.0")
                    .with_output("produce")
                    .with_tunable(
                        "strategy",
                        HyperValue::Str("mean".into()),
                        ParameterKind::Choice {
                            values: vec![json!("mean"), json!("median")],
                        },
                    ),
            )
            .with_step(
                StepTemplate::new("xgboost.XGBClassifier")
                    .with_argument("inputs", ArgumentKind::Container, "steps.0.produce")
                    .with_output("produce")
                    .with_tunable(
                        "max_depth",
                        HyperValue::Int(6),
                        ParameterKind::IntRange { low: 2, high: 10 },
                    )
                    .with_tunable(
                        "learning_rate",
                        HyperValue::Float(0.1),
                        ParameterKind::LogUniform { low: 0.001, high: 1.0 },
                    )
                    .with_fixed("n_jobs", HyperValue::Int(-1)),
            )
            .with_output("outputs", "steps.1.produce")
    }

    #[test]
    fn proposal_values_override_defaults() {
        let template = template();
        let proposal = HyperparameterAssignment::new()
            .with(1, "max_depth", ParameterValue::Int(3))
            .with(0, "strategy", ParameterValue::Json(json!("median")));

        let candidate = CandidateBuilder::new().build(&template, &proposal).unwrap();
        let steps = &candidate.pipeline.steps;

        assert_eq!(candidate.state, CandidateState::Built);
        assert_eq!(candidate.template_name, "xgb_classification");
        assert_eq!(steps[0].hyperparams["strategy"], HyperValue::Str("median".into()));
        assert_eq!(steps[1].hyperparams["max_depth"], HyperValue::Int(3));
        assert_eq!(steps[1].hyperparams["learning_rate"], HyperValue::Float(0.1));
        assert_eq!(steps[1].hyperparams["n_jobs"], HyperValue::Int(-1));
        assert_eq!(candidate.pipeline.outputs, template.outputs);
        assert_eq!(steps[1].arguments, template.steps[1].arguments);
    }

    #[test]
    fn identical_builds_share_structure_not_identity() {
        let template = template();
        let proposal = HyperparameterAssignment::new().with(1, "learning_rate", ParameterValue::Float(0.05));
        let builder = CandidateBuilder::new();

        let first = builder.build(&template, &proposal).unwrap();
        let second = builder.build(&template, &proposal).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.pipeline, second.pipeline);
    }

    #[test]
    fn template_is_left_untouched() {
        let template = template();
        let before = template.clone();
        let proposal = HyperparameterAssignment::new().with(1, "max_depth", ParameterValue::Int(9));

        let mut candidate = CandidateBuilder::new().build(&template, &proposal).unwrap();
        candidate.pipeline.steps[0].primitive = "mutated".into();

        assert_eq!(template, before);
    }

    #[test]
    fn sentinel_binds_as_absent() {
        let proposal =
            HyperparameterAssignment::new().with(0, "strategy", ParameterValue::Json(json!("None")));
        let candidate = CandidateBuilder::new().build(&template(), &proposal).unwrap();
        assert!(candidate.pipeline.steps[0].hyperparams["strategy"].is_absent());
    }

    #[test]
    fn unknown_targets_are_rejected() {
        let builder = CandidateBuilder::new();

        let out_of_range = HyperparameterAssignment::new().with(5, "max_depth", ParameterValue::Int(3));
        assert_eq!(
            builder.build(&template(), &out_of_range).unwrap_err(),
            BuildError::UnknownStep { step: 5, steps: 2 }
        );

        let undeclared = HyperparameterAssignment::new().with(0, "max_depth", ParameterValue::Int(3));
        assert!(matches!(
            builder.build(&template(), &undeclared),
            Err(BuildError::UnknownHyperparameter { step: 0, .. })
        ));
    }

    #[test]
    fn mapping_values_are_unsupported() {
        let proposal = HyperparameterAssignment::new()
            .with(1, "max_depth", ParameterValue::Json(json!({"depth": 3})));
        assert!(matches!(
            CandidateBuilder::new().build(&template(), &proposal),
            Err(BuildError::UnsupportedValue { step: 1, .. })
        ));
    }
}
