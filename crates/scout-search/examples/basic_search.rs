use async_trait::async_trait;
use scout_search::*;
use scout_types::*;
use std::sync::Arc;
use std::time::Duration;

/// Toy engine: the closer `max_depth` is to 6 and `learning_rate` to 0.1,
/// the better every fold scores. Dummy estimators score poorly.
struct SyntheticEngine;

#[async_trait]
impl ScoringEngine for SyntheticEngine {
    async fn cross_validate(
        &self,
        _dataset: &DatasetHandle,
        _problem: &Problem,
        pipeline: &PipelineDescription,
        _metrics: &[MetricSpec],
        options: &ScoreOptions,
    ) -> Result<CvReport, EvaluationError> {
        let mut score = 0.92;
        for step in &pipeline.steps {
            if step.primitive.contains("Dummy") {
                score -= 0.3;
            }
            if let Some(HyperValue::Int(depth)) = step.hyperparams.get("max_depth") {
                score -= 0.02 * (*depth - 6).abs() as f64;
            }
            if let Some(HyperValue::Float(rate)) = step.hyperparams.get("learning_rate") {
                score -= 0.01 * (rate / 0.1).ln().abs();
            }
        }
        let folds = (0..options.folds).map(|i| score - 0.005 * i as f64).collect();
        Ok(CvReport::scored(folds))
    }
}

fn templates() -> InMemoryTemplateLibrary {
    InMemoryTemplateLibrary::new()
        .with_template(
            Template::new("fallback_pipeline")
                .with_input("inputs")
                .with_step(StepTemplate::new("sklearn.dummy.DummyClassifier").with_output("produce"))
                .with_output("outputs", "steps.0.produce"),
        )
        .with_template(
            Template::new("xgb_classification")
                .with_input("inputs")
                .with_step(
                    StepTemplate::new("sklearn.impute.SimpleImputer")
                        .with_argument("inputs", ArgumentKind::Container, "inputs.0")
                        .with_output("produce")
                        .with_fixed("strategy", HyperValue::Str("mean".into())),
                )
                .with_step(
                    StepTemplate::new("xgboost.XGBClassifier")
                        .with_argument("inputs", ArgumentKind::Container, "steps.0.produce")
                        .with_output("produce")
                        .with_tunable("max_depth", HyperValue::Int(3), ParameterKind::IntRange { low: 2, high: 10 })
                        .with_tunable(
                            "learning_rate",
                            HyperValue::Float(0.3),
                            ParameterKind::LogUniform { low: 0.01, high: 1.0 },
                        ),
                )
                .with_output("outputs", "steps.1.produce"),
        )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("Scout basic search example");

    let output = tempfile::tempdir()?;
    let config = SearchConfig::from_env()?.with_output_dir(output.path());
    let controller = SearchController::new(config, Arc::new(templates()), Arc::new(SyntheticEngine))?;

    let dataset = DatasetHandle::new("185_baseball", "file:///datasets/185_baseball", DataModality::SingleTable);
    let problem = Problem::new("185_baseball_problem", TaskType::Classification, "Multiclass")
        .with_metric(Metric::F1Macro);

    let outcome = controller
        .search(&dataset, &problem, Some(Duration::from_secs(30)), Some(20), None)
        .await?;

    println!(
        "Best: {:?} ({:?}) score {:?} after {:?} tuning iterations [{:?}]",
        outcome.best_template_name,
        outcome.best_pipeline_id,
        outcome.best_score,
        outcome.completed_iterations,
        outcome.termination
    );

    println!("Top 5:");
    for record in controller.store().solutions().iter().take(5) {
        println!(
            "  {} {:<20} score={:?} rank={:.6}",
            record.id,
            record.template_name,
            record.score,
            record.rank.unwrap_or(f64::NAN)
        );
    }

    Ok(())
}
