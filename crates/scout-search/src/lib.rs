//! # scout-search
//!
//! Anytime search over a library of pipeline templates.
//!
//! Provides:
//! - Candidate building from templates and tuner proposals
//! - Cross-validated evaluation, with crash-prone candidates isolated in a
//!   short-lived worker process
//! - Persistence of every candidate and a ranked leaderboard
//! - The search controller: fallback-first seeding, budget and deadline
//!   enforcement, failure escalation and best-so-far tracking

pub mod builder;
pub mod config;
pub mod controller;
pub mod engine;
pub mod evaluator;
pub mod events;
pub mod library;
pub mod routing;
pub mod session;
pub mod store;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use builder::CandidateBuilder;
pub use config::{IsolationConfig, SearchConfig};
pub use controller::{SearchController, SearchOutcome};
pub use engine::{CvReport, ScoringEngine};
pub use evaluator::Evaluator;
pub use events::SearchEvent;
pub use library::{InMemoryTemplateLibrary, TemplateLibrary};
pub use routing::{Route, RoutingTable};
pub use session::{BestSoFar, HardDeadline, SearchSession, StopHandle, Termination};
pub use store::{CandidateRecord, ResultStore, StoreArea, StoreStats, RANK_JITTER};
pub use worker::{WorkerCommand, WorkerRequest, WorkerResponse};
