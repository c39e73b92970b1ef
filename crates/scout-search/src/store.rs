//! On-disk candidate records and the in-memory leaderboard.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use scout_types::{
    Candidate, CandidateId, CandidateState, PersistenceError, PipelineDescription,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Upper bound of the random tie-breaker added to a rank. Only candidates
/// with equal normalized scores can be reordered by it.
pub const RANK_JITTER: f64 = 1e-12;

/// Where a candidate record was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreArea {
    /// Built but never evaluated.
    Searched,
    /// Evaluated, successfully or as a tolerated failure.
    Scored,
    /// Evaluated and placed on the leaderboard.
    Ranked,
}

impl StoreArea {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Searched => "pipelines_searched",
            Self::Scored => "pipelines_scored",
            Self::Ranked => "pipelines_ranked",
        }
    }
}

/// Serialized form of a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: CandidateId,
    pub template_name: String,
    pub pipeline: PipelineDescription,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cv_scores: Vec<f64>,
    pub score: Option<f64>,
    pub normalized_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Candidate> for CandidateRecord {
    fn from(candidate: &Candidate) -> Self {
        Self {
            id: candidate.id,
            template_name: candidate.template_name.clone(),
            pipeline: candidate.pipeline.clone(),
            cv_scores: candidate.cv_scores.clone(),
            score: candidate.score,
            normalized_score: candidate.normalized_score,
            rank: candidate.rank,
            error: candidate.error.clone(),
            created_at: candidate.created_at,
        }
    }
}

/// Record counts per area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub searched: usize,
    pub scored: usize,
    pub ranked: usize,
}

impl StoreStats {
    pub fn total(&self) -> usize {
        self.searched + self.scored
    }
}

#[derive(Default)]
struct Ledger {
    persisted: HashSet<CandidateId>,
    stats: StoreStats,
}

/// Persists candidates under `root` and keeps the ranked solutions list.
///
/// Safe to share: readers may call [`ResultStore::solutions`] while a search
/// is persisting.
pub struct ResultStore {
    root: PathBuf,
    materialize_leaderboard: bool,
    ledger: Mutex<Ledger>,
    solutions: RwLock<Vec<CandidateRecord>>,
}

impl ResultStore {
    pub fn new<P: AsRef<Path>>(root: P, materialize_leaderboard: bool) -> Result<Self, PersistenceError> {
        let root = root.as_ref().to_path_buf();
        for area in [StoreArea::Searched, StoreArea::Scored, StoreArea::Ranked] {
            std::fs::create_dir_all(root.join(area.dir_name()))?;
        }

        Ok(Self {
            root,
            materialize_leaderboard,
            ledger: Mutex::new(Ledger::default()),
            solutions: RwLock::new(Vec::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn materializes_leaderboard(&self) -> bool {
        self.materialize_leaderboard
    }

    pub fn record_path(&self, area: StoreArea, id: CandidateId) -> PathBuf {
        self.root.join(area.dir_name()).join(format!("{id}.json"))
    }

    /// Write the candidate to the area matching its state and, if it was
    /// evaluated and the leaderboard is materialized, rank it.
    ///
    /// On success the candidate is marked persisted and its final area is
    /// returned. A candidate is accepted at most once.
    pub fn persist(&self, candidate: &mut Candidate) -> Result<StoreArea, PersistenceError> {
        if candidate.state == CandidateState::Persisted
            || self.ledger.lock().persisted.contains(&candidate.id)
        {
            return Err(PersistenceError::AlreadyPersisted {
                candidate_id: candidate.id.to_string(),
            });
        }

        let area = match candidate.state {
            CandidateState::Built => {
                self.write(StoreArea::Searched, &CandidateRecord::from(&*candidate))?;
                StoreArea::Searched
            }
            _ => {
                self.write(StoreArea::Scored, &CandidateRecord::from(&*candidate))?;
                if self.materialize_leaderboard {
                    let mut solutions = self.solutions.write();
                    candidate.rank = Some(rank_among(&solutions, candidate.normalized_or_zero()));
                    let record = CandidateRecord::from(&*candidate);
                    if let Err(e) = self.write(StoreArea::Ranked, &record) {
                        drop(solutions);
                        candidate.rank = None;
                        self.discard(StoreArea::Scored, candidate.id);
                        return Err(e);
                    }
                    solutions.push(record);
                    StoreArea::Ranked
                } else {
                    StoreArea::Scored
                }
            }
        };

        {
            let mut ledger = self.ledger.lock();
            ledger.persisted.insert(candidate.id);
            match area {
                StoreArea::Searched => ledger.stats.searched += 1,
                StoreArea::Scored => ledger.stats.scored += 1,
                StoreArea::Ranked => {
                    ledger.stats.scored += 1;
                    ledger.stats.ranked += 1;
                }
            }
        }

        candidate.mark_persisted();
        debug!(candidate = %candidate.id, area = area.dir_name(), rank = ?candidate.rank, "Persisted candidate");
        Ok(area)
    }

    /// Ranked solutions, best first.
    pub fn solutions(&self) -> Vec<CandidateRecord> {
        let mut solutions = self.solutions.read().clone();
        solutions.sort_by(|a, b| {
            a.rank
                .unwrap_or(f64::INFINITY)
                .total_cmp(&b.rank.unwrap_or(f64::INFINITY))
        });
        solutions
    }

    pub fn stats(&self) -> StoreStats {
        self.ledger.lock().stats
    }

    /// Read a record back from disk.
    pub fn load(&self, area: StoreArea, id: CandidateId) -> Result<CandidateRecord, PersistenceError> {
        let bytes = std::fs::read(self.record_path(area, id))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write(&self, area: StoreArea, record: &CandidateRecord) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(record)?;
        std::fs::write(self.record_path(area, record.id), json)?;
        Ok(())
    }

    fn discard(&self, area: StoreArea, id: CandidateId) {
        if let Err(e) = std::fs::remove_file(self.record_path(area, id)) {
            warn!(candidate = %id, area = area.dir_name(), error = %e, "Failed to remove partial record");
        }
    }
}

/// `1 - normalized` plus up to [`RANK_JITTER`], kept strictly between the
/// ranks of better and worse entries already on the leaderboard.
fn rank_among(solutions: &[CandidateRecord], normalized: f64) -> f64 {
    let mut floor = f64::NEG_INFINITY;
    let mut ceiling = f64::INFINITY;
    for record in solutions {
        let Some(rank) = record.rank else { continue };
        let other = record.normalized_score.unwrap_or(0.0);
        if other > normalized {
            floor = floor.max(rank);
        } else if other < normalized {
            ceiling = ceiling.min(rank);
        }
    }

    let base = 1.0 - normalized;
    let (low, high) = (base.max(floor), (base + RANK_JITTER).min(ceiling));
    let (low, high) = if low < high {
        (low, high)
    } else if floor.is_finite() {
        (floor, ceiling.min(floor + RANK_JITTER))
    } else {
        (ceiling - RANK_JITTER, ceiling)
    };

    let rank = low + rand::thread_rng().gen::<f64>() * (high - low);
    if rank > floor && rank < ceiling {
        rank
    } else {
        low / 2.0 + high / 2.0
    }
}
