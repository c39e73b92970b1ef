//! Search configuration.

use scout_tuning::{StrategyKind, TunerSettings};
use scout_types::{config_error, ScoreOptions, ScoutResult, SearchError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::routing::RoutingTable;
use crate::worker::WorkerCommand;

pub const ENV_OUTPUT_DIR: &str = "SCOUT_OUTPUT_DIR";
pub const ENV_HARD_DEADLINE: &str = "SCOUT_HARD_DEADLINE";
pub const ENV_WORKER_TIMEOUT_SECS: &str = "SCOUT_WORKER_TIMEOUT_SECS";
pub const ENV_FALLBACK_TEMPLATE: &str = "SCOUT_FALLBACK_TEMPLATE";
/// Worker program followed by its arguments, whitespace separated.
pub const ENV_WORKER_COMMAND: &str = "SCOUT_WORKER_COMMAND";
/// Comma-separated primitive identifiers scored in the worker.
pub const ENV_ISOLATION_DENYLIST: &str = "SCOUT_ISOLATION_DENYLIST";

/// Which candidates are scored out of process, and how.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IsolationConfig {
    /// Primitive identifiers known to crash their host process.
    #[serde(default)]
    pub denylist: Vec<String>,
    #[serde(default)]
    pub worker: Option<WorkerCommand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Template scored before anything else to seed the result.
    pub fallback_template: String,
    pub scoring: ScoreOptions,
    /// Preempt an in-flight evaluation when the deadline passes.
    pub hard_deadline: bool,
    /// Rank evaluated candidates and keep the solutions list.
    pub materialize_leaderboard: bool,
    pub output_dir: PathBuf,
    pub isolation: IsolationConfig,
    pub tuner: TunerSettings,
    pub routing: RoutingTable,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fallback_template: "fallback_pipeline".to_string(),
            scoring: ScoreOptions::default(),
            hard_deadline: false,
            materialize_leaderboard: true,
            output_dir: PathBuf::from("output"),
            isolation: IsolationConfig::default(),
            tuner: TunerSettings::default(),
            routing: RoutingTable::default(),
        }
    }
}

impl SearchConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ScoutResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `SCOUT_*` environment variables.
    pub fn from_env() -> ScoutResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> ScoutResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_OUTPUT_DIR) {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(name) = lookup(ENV_FALLBACK_TEMPLATE) {
            config.fallback_template = name;
        }
        if let Some(raw) = lookup(ENV_HARD_DEADLINE) {
            config.hard_deadline = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => return Err(config_error!("{ENV_HARD_DEADLINE} must be a boolean, got {other:?}")),
            };
        }
        if let Some(raw) = lookup(ENV_WORKER_COMMAND) {
            let mut parts = raw.split_whitespace();
            let program = parts
                .next()
                .ok_or_else(|| config_error!("{ENV_WORKER_COMMAND} is set but empty"))?;
            config.isolation.worker = Some(WorkerCommand::new(program).with_args(parts));
        }
        if let Some(raw) = lookup(ENV_ISOLATION_DENYLIST) {
            config.isolation.denylist = raw
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = lookup(ENV_WORKER_TIMEOUT_SECS) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| config_error!("{ENV_WORKER_TIMEOUT_SECS} must be a whole number, got {raw:?}"))?;
            let worker = config.isolation.worker.as_mut().ok_or_else(|| {
                config_error!("{ENV_WORKER_TIMEOUT_SECS} is set but {ENV_WORKER_COMMAND} is not")
            })?;
            worker.timeout_ms = secs.saturating_mul(1000);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        if self.fallback_template.trim().is_empty() {
            return Err(SearchError::Config("fallback template name is empty".to_string()));
        }
        if self.scoring.folds == 0 {
            return Err(SearchError::Config("cross-validation needs at least one fold".to_string()));
        }
        if !self.isolation.denylist.is_empty() && self.isolation.worker.is_none() {
            return Err(SearchError::Config(
                "isolation denylist is set but no worker command is configured".to_string(),
            ));
        }
        if self.isolation.worker.as_ref().is_some_and(|w| w.timeout_ms == 0) {
            return Err(SearchError::Config("worker timeout must be positive".to_string()));
        }
        Ok(())
    }

    pub fn with_fallback_template(mut self, name: impl Into<String>) -> Self {
        self.fallback_template = name.into();
        self
    }

    pub fn with_scoring(mut self, scoring: ScoreOptions) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_hard_deadline(mut self, enabled: bool) -> Self {
        self.hard_deadline = enabled;
        self
    }

    pub fn with_leaderboard(mut self, materialize: bool) -> Self {
        self.materialize_leaderboard = materialize;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_isolation<I, S>(mut self, denylist: I, worker: WorkerCommand) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.isolation = IsolationConfig {
            denylist: denylist.into_iter().map(Into::into).collect(),
            worker: Some(worker),
        };
        self
    }

    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        if let Some(worker) = self.isolation.worker.take() {
            self.isolation.worker = Some(worker.with_timeout(timeout));
        }
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind, exploration_weight: f64) -> Self {
        self.tuner.strategy = strategy;
        self.tuner.exploration_weight = exploration_weight;
        self
    }

    pub fn with_tuner(mut self, tuner: TunerSettings) -> Self {
        self.tuner = tuner;
        self
    }

    pub fn with_routing(mut self, routing: RoutingTable) -> Self {
        self.routing = routing;
        self
    }
}
