use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the Scout system
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Tuning error: {0}")]
    Tuning(#[from] TuningError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while binding a proposal onto a template
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("Proposal references step {step}, but the template has {steps} steps")]
    UnknownStep { step: usize, steps: usize },

    #[error("Step {step} declares no hyperparameter named {name}")]
    UnknownHyperparameter { step: usize, name: String },

    #[error("Unsupported value for {step}.{name}: {reason}")]
    UnsupportedValue {
        step: usize,
        name: String,
        reason: String,
    },
}

/// Per-candidate evaluation failures
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EvaluationError {
    /// Root cause reported by the scoring engine when no fold succeeded.
    #[error("{message}")]
    Scoring { message: String },

    #[error("Scoring engine failure: {message}")]
    Engine { message: String },

    #[error("Evaluation crashed: worker produced no result ({status})")]
    WorkerCrashed { status: String },

    #[error("Evaluation worker timed out after {millis} ms")]
    WorkerTimeout { millis: u64 },

    #[error("Evaluation worker I/O failure: {message}")]
    WorkerIo { message: String },
}

impl EvaluationError {
    /// Whether the failure came from the isolated worker dying without a result.
    pub fn is_crash(&self) -> bool {
        matches!(self, Self::WorkerCrashed { .. })
    }
}

/// Errors writing candidate records
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Candidate {candidate_id} was already persisted")]
    AlreadyPersisted { candidate_id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Tuner failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TuningError {
    #[error("Tuner roster is empty")]
    EmptyRoster,

    #[error("Template not in tuner roster: {name}")]
    UnknownTemplate { name: String },

    #[error("Search space exhausted for template {template}")]
    Exhausted { template: String },
}

/// Errors that end a search call
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Fallback template {template} could not be scored: {message}")]
    Fallback { template: String, message: String },

    #[error("Unsupported problem: no templates for {modality} / {task_type}")]
    UnsupportedProblem { modality: String, task_type: String },

    #[error("Template not found: {name}")]
    UnknownTemplate { name: String },

    #[error("Invalid search configuration: {0}")]
    Config(String),

    #[error("Escalated after {} default-phase failures", .messages.len())]
    Escalated { messages: Vec<String> },

    #[error("Tuner failure: {0}")]
    Tuning(#[from] TuningError),
}

/// Result type alias for Scout operations
pub type ScoutResult<T> = Result<T, ScoutError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::ScoutError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BuildError::UnknownStep { step: 4, steps: 2 };
        assert!(error.to_string().contains("step 4"));
        assert!(error.to_string().contains("2 steps"));

        let escalated = SearchError::Escalated {
            messages: vec!["a".into(), "b".into(), "c".into()],
        };
        assert_eq!(escalated.to_string(), "Escalated after 3 default-phase failures");
    }

    #[test]
    fn test_scoring_error_shows_root_cause_only() {
        let error = EvaluationError::Scoring {
            message: "ValueError: input contains NaN".into(),
        };
        assert_eq!(error.to_string(), "ValueError: input contains NaN");
        assert!(!error.is_crash());
        assert!(EvaluationError::WorkerCrashed { status: "signal 11".into() }.is_crash());
    }

    #[test]
    fn test_error_conversion() {
        let tuning = TuningError::EmptyRoster;
        let scout: ScoutError = SearchError::from(tuning).into();

        match scout {
            ScoutError::Search(SearchError::Tuning(TuningError::EmptyRoster)) => (),
            other => panic!("Expected tuning error, got {other:?}"),
        }
    }

    #[test]
    fn test_macros() {
        let err = config_error!("Missing required field: {}", "fallback_template");
        assert!(err.to_string().contains("fallback_template"));
    }
}
