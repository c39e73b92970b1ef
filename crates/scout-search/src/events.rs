use scout_types::CandidateId;
use serde::{Deserialize, Serialize};

use crate::session::Termination;

/// Progress notifications published while a search runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SearchEvent {
    SessionStarted {
        roster: Vec<String>,
        timeout_secs: Option<f64>,
        budget: Option<usize>,
    },
    CandidateEvaluated {
        candidate_id: CandidateId,
        template_name: String,
        /// Zero for the fallback.
        iteration: usize,
        normalized_score: f64,
        failed: bool,
    },
    NewBest {
        candidate_id: CandidateId,
        template_name: String,
        normalized_score: f64,
    },
    SessionFinished {
        termination: Termination,
        completed_iterations: Option<usize>,
        best_normalized_score: Option<f64>,
    },
}
