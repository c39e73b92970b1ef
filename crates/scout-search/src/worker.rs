//! Out-of-process evaluation.
//!
//! The parent spawns a short-lived worker, writes one JSON request to its
//! stdin and reads one JSON response line from its stdout. A worker that exits
//! without writing a response has crashed. The worker binary itself is built
//! by the embedding application around [`serve`].

use anyhow::Context;
use scout_types::{
    CandidateId, DatasetHandle, EvaluationError, MetricSpec, PipelineDescription, Problem,
    ScoreOptions,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::engine::{CvReport, ScoringEngine};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub candidate_id: CandidateId,
    pub dataset: DatasetHandle,
    pub problem: Problem,
    pub pipeline: PipelineDescription,
    pub metrics: Vec<MetricSpec>,
    pub options: ScoreOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerResponse {
    Report(CvReport),
    Failed(EvaluationError),
}

fn default_timeout_ms() -> u64 {
    30 * 60 * 1000
}

/// How to launch the worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
    /// Wall-clock bound on one evaluation, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Run one request in a fresh worker process.
    ///
    /// The child is killed once the exchange ends, whatever the outcome, and
    /// is also killed if this future is dropped mid-flight.
    pub async fn run(&self, request: &WorkerRequest) -> Result<CvReport, EvaluationError> {
        let payload = serde_json::to_vec(request).map_err(|e| EvaluationError::WorkerIo {
            message: format!("encoding request: {e}"),
        })?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EvaluationError::WorkerIo {
                message: format!("spawning {}: {e}", self.program.display()),
            })?;

        debug!(
            candidate = %request.candidate_id,
            pid = child.id(),
            "Spawned evaluation worker"
        );

        let (mut stdin, mut stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.start_kill();
                return Err(EvaluationError::WorkerIo {
                    message: "worker pipes unavailable".to_string(),
                });
            }
        };

        let exchange = async {
            // A worker that dies before reading its request is reported as a
            // crash below, not as a write failure.
            if let Err(e) = stdin.write_all(&payload).await {
                debug!(error = %e, "Worker closed stdin early");
            }
            drop(stdin);

            let mut output = Vec::new();
            stdout.read_to_end(&mut output).await?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, output))
        };

        let outcome = tokio::time::timeout(self.timeout(), exchange).await;
        // Already reaped on the normal path, in which case this is a no-op error.
        let _ = child.start_kill();

        let (status, output) = match outcome {
            Err(_) => {
                warn!(
                    candidate = %request.candidate_id,
                    timeout_ms = self.timeout_ms,
                    "Evaluation worker timed out, killed"
                );
                return Err(EvaluationError::WorkerTimeout {
                    millis: self.timeout_ms,
                });
            }
            Ok(Err(e)) => {
                return Err(EvaluationError::WorkerIo {
                    message: e.to_string(),
                })
            }
            Ok(Ok(result)) => result,
        };

        let response = String::from_utf8_lossy(&output)
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| serde_json::from_str::<WorkerResponse>(line).ok());

        match response {
            Some(WorkerResponse::Report(report)) => Ok(report),
            Some(WorkerResponse::Failed(error)) => Err(error),
            None => {
                warn!(
                    candidate = %request.candidate_id,
                    status = %status,
                    "Evaluation worker exited without a result"
                );
                Err(EvaluationError::WorkerCrashed {
                    status: status.to_string(),
                })
            }
        }
    }
}

/// Worker-side entry point: read one request from stdin, score it, write one
/// response line to stdout.
///
/// Logging goes to stderr; stdout carries nothing but the response.
pub async fn serve<E>(engine: &E) -> anyhow::Result<()>
where
    E: ScoringEngine + ?Sized,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let mut input = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut input)
        .await
        .context("reading worker request")?;
    let request: WorkerRequest =
        serde_json::from_slice(&input).context("decoding worker request")?;

    info!(candidate = %request.candidate_id, folds = request.options.folds, "Worker scoring candidate");

    let response = match engine
        .cross_validate(
            &request.dataset,
            &request.problem,
            &request.pipeline,
            &request.metrics,
            &request.options,
        )
        .await
    {
        Ok(report) => WorkerResponse::Report(report),
        Err(error) => WorkerResponse::Failed(error),
    };

    let mut line = serde_json::to_vec(&response).context("encoding worker response")?;
    line.push(b'\n');

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&line).await.context("writing worker response")?;
    stdout.flush().await.context("flushing worker response")?;
    Ok(())
}
