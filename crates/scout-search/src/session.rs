//! Per-call search state.

use chrono::{DateTime, Utc};
use scout_types::{Candidate, CandidateId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// How a search session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Budget used up.
    Completed,
    /// `stop()` was called.
    Cancelled,
    /// Deadline passed, cooperatively or by preemption.
    TimedOut,
    /// Too many default-phase failures.
    Escalated,
    /// The tuner could not propose anything further.
    Aborted,
}

/// Cooperative stop flag shared between the controller and its callers.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Best candidate seen so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestSoFar {
    pub candidate_id: CandidateId,
    pub score: Option<f64>,
    pub normalized_score: f64,
    pub template_name: String,
}

impl BestSoFar {
    fn from_candidate(candidate: &Candidate) -> Self {
        Self {
            candidate_id: candidate.id,
            score: candidate.score,
            normalized_score: candidate.normalized_or_zero(),
            template_name: candidate.template_name.clone(),
        }
    }
}

/// Mutable state of one `search` call. Owned by the controller for the
/// duration of the call and never shared.
#[derive(Debug)]
pub struct SearchSession {
    pub started_at: DateTime<Utc>,
    start: Instant,
    deadline: Option<Instant>,
    stop: StopHandle,
    hard_timeout: Arc<AtomicBool>,
    pub iteration: usize,
    pub best: Option<BestSoFar>,
    /// Escalated (default-phase) failure messages, in order.
    pub errors: Vec<String>,
    pub roster: Vec<String>,
    error_budget: usize,
}

impl SearchSession {
    pub fn new(
        roster: Vec<String>,
        timeout: Option<Duration>,
        budget: Option<usize>,
        stop: StopHandle,
    ) -> Self {
        let start = Instant::now();
        let error_budget = budget.map_or(roster.len(), |b| b.min(roster.len()));
        Self {
            started_at: Utc::now(),
            start,
            deadline: timeout.map(|t| start + t),
            stop,
            hard_timeout: Arc::new(AtomicBool::new(false)),
            iteration: 0,
            best: None,
            errors: Vec::new(),
            roster,
            error_budget,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn error_budget(&self) -> usize {
        self.error_budget
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn hard_timeout_fired(&self) -> bool {
        self.hard_timeout.load(Ordering::SeqCst)
    }

    /// Arm preemption at the deadline, if there is one.
    pub fn arm_hard_deadline(&self) -> Option<HardDeadline> {
        self.deadline
            .map(|deadline| HardDeadline::arm(deadline.into(), Arc::clone(&self.hard_timeout)))
    }

    /// The loop's only cooperative checkpoint.
    pub fn check_stop(&self) -> Option<Termination> {
        if self.stop.is_stopped() {
            Some(Termination::Cancelled)
        } else if self.hard_timeout_fired() || self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(Termination::TimedOut)
        } else {
            None
        }
    }

    /// Take `candidate` as the new best if it strictly beats the current one.
    ///
    /// Returns whether the best changed. Unevaluated candidates never count.
    pub fn offer(&mut self, candidate: &Candidate) -> bool {
        let Some(normalized) = candidate.normalized_score else {
            return false;
        };
        let improves = self
            .best
            .as_ref()
            .map_or(true, |best| normalized > best.normalized_score);
        if improves {
            self.best = Some(BestSoFar::from_candidate(candidate));
        }
        improves
    }

    /// Record an escalated failure; true once the error budget is spent.
    pub fn record_failure(&mut self, message: String) -> bool {
        self.errors.push(message);
        self.errors.len() >= self.error_budget
    }

    /// Iterations beyond the first pass over the roster, if any.
    pub fn completed_iterations(&self) -> Option<usize> {
        self.iteration
            .checked_sub(self.roster.len())
            .filter(|completed| *completed > 0)
    }
}

/// Armed hard deadline. A supervisor task sleeps until the deadline, raises
/// the session's hard-timeout flag and wakes every [`HardDeadline::fired`]
/// waiter. Dropping the guard disarms it.
#[derive(Debug)]
pub struct HardDeadline {
    fired: watch::Receiver<bool>,
    supervisor: JoinHandle<()>,
}

impl HardDeadline {
    pub fn arm(deadline: tokio::time::Instant, flag: Arc<AtomicBool>) -> Self {
        let (tx, rx) = watch::channel(false);
        let supervisor = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            flag.store(true, Ordering::SeqCst);
            warn!("Hard deadline reached");
            let _ = tx.send(true);
        });
        Self {
            fired: rx,
            supervisor,
        }
    }

    /// Resolves once the deadline has passed. Pends forever if disarmed first.
    pub async fn fired(&self) {
        let mut rx = self.fired.clone();
        let disarmed = rx.wait_for(|fired| *fired).await.is_err();
        if disarmed {
            std::future::pending::<()>().await;
        }
    }

    pub fn disarm(self) {}
}

impl Drop for HardDeadline {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}
