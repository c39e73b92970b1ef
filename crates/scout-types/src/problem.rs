//! Problem, dataset and metric descriptors handed in by the caller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of data a dataset holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataModality {
    SingleTable,
    MultiTable,
    Image,
    Text,
    Timeseries,
    Graph,
    Audio,
}

impl fmt::Display for DataModality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SingleTable => "single_table",
            Self::MultiTable => "multi_table",
            Self::Image => "image",
            Self::Text => "text",
            Self::Timeseries => "timeseries",
            Self::Graph => "graph",
            Self::Audio => "audio",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Classification,
    Regression,
    CollaborativeFiltering,
    Clustering,
    LinkPrediction,
    TimeSeriesForecasting,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Classification => "classification",
            Self::Regression => "regression",
            Self::CollaborativeFiltering => "collaborative_filtering",
            Self::Clustering => "clustering",
            Self::LinkPrediction => "link_prediction",
            Self::TimeSeriesForecasting => "time_series_forecasting",
        };
        f.write_str(name)
    }
}

/// Performance metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
    Precision,
    Recall,
    F1,
    F1Micro,
    F1Macro,
    RocAuc,
    RSquared,
    MeanSquaredError,
    RootMeanSquaredError,
    MeanAbsoluteError,
}

impl Metric {
    pub fn higher_is_better(&self) -> bool {
        !matches!(
            self,
            Self::MeanSquaredError | Self::RootMeanSquaredError | Self::MeanAbsoluteError
        )
    }

    /// Map a raw score into [0, 1] where higher is always better.
    pub fn normalize(&self, raw: f64) -> f64 {
        if !raw.is_finite() {
            return 0.0;
        }

        let normalized = match self {
            Self::Accuracy
            | Self::Precision
            | Self::Recall
            | Self::F1
            | Self::F1Micro
            | Self::F1Macro
            | Self::RocAuc => raw,
            Self::RSquared => (raw + 1.0) / 2.0,
            Self::MeanSquaredError | Self::RootMeanSquaredError | Self::MeanAbsoluteError => {
                1.0 / (1.0 + raw.max(0.0))
            }
        };

        normalized.clamp(0.0, 1.0)
    }
}

/// A metric plus its parameters (e.g. `pos_label`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub metric: Metric,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl MetricSpec {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            params: BTreeMap::new(),
        }
    }
}

/// Problem descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub task_type: TaskType,
    pub task_subtype: String,
    pub metrics: Vec<MetricSpec>,
}

impl Problem {
    pub fn new(id: impl Into<String>, task_type: TaskType, task_subtype: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type,
            task_subtype: task_subtype.into(),
            metrics: Vec::new(),
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metrics.push(MetricSpec::new(metric));
        self
    }

    /// The metric candidates are normalized against.
    pub fn primary_metric(&self) -> Option<&MetricSpec> {
        self.metrics.first()
    }
}

/// Opaque dataset handle. Loading is the scoring engine's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetHandle {
    pub id: String,
    pub uri: String,
    pub modality: DataModality,
}

impl DatasetHandle {
    pub fn new(id: impl Into<String>, uri: impl Into<String>, modality: DataModality) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            modality,
        }
    }
}

/// Cross-validation settings for one scoring call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOptions {
    /// Overrides the problem's metrics when set.
    #[serde(default)]
    pub metrics: Option<Vec<MetricSpec>>,
    pub seed: u64,
    pub folds: usize,
    pub stratified: bool,
    pub shuffle: bool,
}

impl Default for ScoreOptions {
    fn default() -> Self {
        Self {
            metrics: None,
            seed: 0,
            folds: 5,
            stratified: false,
            shuffle: false,
        }
    }
}
