//! Analytical steps the orchestrator chains together. Each step takes the
//! request text plus the last analytical result and returns a `StepOutput`.

pub mod anomaly_detection;
pub mod common;
pub mod cube_operations;
pub mod dimension_navigator;
pub mod kpi_calculator;
pub mod report;
pub mod visualization;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::llm::LlmClient;
use crate::core::warehouse::{QueryResult, Row, Warehouse, WarehouseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    DimensionNavigator,
    CubeOperations,
    KpiCalculator,
    AnomalyDetection,
    Report,
    Visualization,
}

/// How the orchestrator routes a step's output into the aggregated result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRole {
    Analytical,
    Anomaly,
    Report,
    Visualization,
}

impl StepId {
    pub const ALL: [StepId; 6] = [
        StepId::DimensionNavigator,
        StepId::CubeOperations,
        StepId::KpiCalculator,
        StepId::AnomalyDetection,
        StepId::Report,
        StepId::Visualization,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepId::DimensionNavigator => "dimension_navigator",
            StepId::CubeOperations => "cube_operations",
            StepId::KpiCalculator => "kpi_calculator",
            StepId::AnomalyDetection => "anomaly_detection",
            StepId::Report => "report",
            StepId::Visualization => "visualization",
        }
    }

    /// Accepts canonical identifiers and the legacy aliases
    /// `report_generator` / `visualization_agent`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dimension_navigator" => Some(StepId::DimensionNavigator),
            "cube_operations" => Some(StepId::CubeOperations),
            "kpi_calculator" => Some(StepId::KpiCalculator),
            "anomaly_detection" => Some(StepId::AnomalyDetection),
            "report" | "report_generator" => Some(StepId::Report),
            "visualization" | "visualization_agent" => Some(StepId::Visualization),
            _ => None,
        }
    }

    pub fn role(self) -> StepRole {
        match self {
            StepId::DimensionNavigator | StepId::CubeOperations | StepId::KpiCalculator => {
                StepRole::Analytical
            }
            StepId::AnomalyDetection => StepRole::Anomaly,
            StepId::Report => StepRole::Report,
            StepId::Visualization => StepRole::Visualization,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            StepId::DimensionNavigator => {
                "Drill-Down & Roll-Up (Year→Quarter→Month, Region→Country, Category→Subcategory)"
            }
            StepId::CubeOperations => {
                "Slice (single filter), Dice (multi-filter), Pivot (rotate view)"
            }
            StepId::KpiCalculator => "YoY growth, MoM change, profit margins, Top-N rankings",
            StepId::AnomalyDetection => "Find outliers, drops, spikes, underperformers",
            StepId::Report => "ALWAYS include last (formats final output, generates insights)",
            StepId::Visualization => "ALWAYS include when data should be charted",
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain failure reported inside a `StepOutput` rather than raised.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error(transparent)]
    Query(#[from] WarehouseError),

    #[error("No data provided")]
    NoData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormattingHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_y: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub executive_summary: String,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub formatting_hints: FormattingHints,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub chart_type: String,
    #[serde(default)]
    pub title: String,
    pub x_col: String,
    pub y_col: String,
    #[serde(default)]
    pub color_col: Option<String>,
    #[serde(default = "default_orientation")]
    pub orientation: String,
    #[serde(default)]
    pub rationale: String,
}

fn default_orientation() -> String {
    "v".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dimension: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub severity: Option<String>,
}

/// Result of one step invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    pub step: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default)]
    pub data: Vec<Row>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub row_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ChartConfig>,
    #[serde(default)]
    pub anomalies: Vec<Anomaly>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StepOutput {
    pub fn new(step: StepId, operation: impl Into<String>) -> Self {
        Self {
            step: step.as_str().to_string(),
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn failed(step: StepId, operation: impl Into<String>, failure: StepFailure) -> Self {
        Self {
            error: Some(failure.to_string()),
            ..Self::new(step, operation)
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn with_table(mut self, table: QueryResult) -> Self {
        self.row_count = table.rows.len();
        self.columns = table.columns;
        self.data = table.rows;
        self
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

#[async_trait]
pub trait Step: Send + Sync {
    fn id(&self) -> StepId;

    fn name(&self) -> &'static str;

    /// Domain failures come back as `Ok` with `error` set; `Err` means the
    /// step could not be invoked at all.
    async fn run(&self, request: &str, context: Option<&StepOutput>)
    -> anyhow::Result<StepOutput>;
}

/// Step dispatch table keyed by the closed set of identifiers.
#[derive(Clone, Default)]
pub struct StepRegistry {
    steps: HashMap<StepId, Arc<dyn Step>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All six steps sharing one decision-service client and one warehouse.
    pub fn standard(llm: Arc<LlmClient>, warehouse: Warehouse) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(dimension_navigator::DimensionNavigator::new(
            llm.clone(),
            warehouse.clone(),
        )));
        registry.register(Arc::new(cube_operations::CubeOperations::new(
            llm.clone(),
            warehouse.clone(),
        )));
        registry.register(Arc::new(kpi_calculator::KpiCalculator::new(
            llm.clone(),
            warehouse.clone(),
        )));
        registry.register(Arc::new(anomaly_detection::AnomalyDetection::new(
            llm.clone(),
            warehouse,
        )));
        registry.register(Arc::new(report::ReportGenerator::new(llm.clone())));
        registry.register(Arc::new(visualization::Visualization::new(llm)));
        registry
    }

    pub fn register(&mut self, step: Arc<dyn Step>) {
        self.steps.insert(step.id(), step);
    }

    /// Unknown or unregistered identifiers resolve to `None`.
    pub fn resolve(&self, id: &str) -> Option<(StepId, Arc<dyn Step>)> {
        let step_id = StepId::parse(id)?;
        self.steps.get(&step_id).map(|s| (step_id, s.clone()))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.steps.keys().map(|id| id.as_str()).collect();
        ids.sort_unstable();
        f.debug_struct("StepRegistry").field("steps", &ids).finish()
    }
}
