//! Maps (data modality, task type) to an ordered template roster.

use scout_types::{DataModality, SearchError, TaskType};
use serde::{Deserialize, Serialize};

/// One routing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub modality: DataModality,
    pub task_type: TaskType,
    pub templates: Vec<String>,
}

/// Deterministic routing table. Lookups never depend on anything but the
/// table contents and the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::empty()
            .with_route(DataModality::SingleTable, TaskType::Classification, ["xgb_classification"])
            .with_route(DataModality::SingleTable, TaskType::Regression, ["xgb_regression"])
            .with_route(
                DataModality::SingleTable,
                TaskType::CollaborativeFiltering,
                ["xgb_regression"],
            )
            .with_route(DataModality::Image, TaskType::Classification, ["image_classification"])
            .with_route(DataModality::Image, TaskType::Regression, ["image_regression"])
    }
}

impl RoutingTable {
    pub fn empty() -> Self {
        Self { routes: Vec::new() }
    }

    /// Add or replace the roster for a key.
    pub fn with_route<I, S>(mut self, modality: DataModality, task_type: TaskType, templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let templates: Vec<String> = templates.into_iter().map(Into::into).collect();
        match self
            .routes
            .iter_mut()
            .find(|r| r.modality == modality && r.task_type == task_type)
        {
            Some(route) => route.templates = templates,
            None => self.routes.push(Route {
                modality,
                task_type,
                templates,
            }),
        }
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route(&self, modality: DataModality, task_type: TaskType) -> Result<Vec<String>, SearchError> {
        self.routes
            .iter()
            .find(|r| r.modality == modality && r.task_type == task_type)
            .filter(|r| !r.templates.is_empty())
            .map(|r| r.templates.clone())
            .ok_or_else(|| SearchError::UnsupportedProblem {
                modality: modality.to_string(),
                task_type: task_type.to_string(),
            })
    }
}
