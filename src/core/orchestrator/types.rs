use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::core::steps::{Anomaly, ChartConfig, Report, StepOutput};
use crate::core::warehouse::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    #[default]
    Simple,
    MultiStep,
}

impl Complexity {
    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::MultiStep => "multi_step",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "simple" => Some(Complexity::Simple),
            "multi_step" | "multistep" => Some(Complexity::MultiStep),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Revenue,
    Profit,
    Quantity,
    ProfitMargin,
}

impl Metric {
    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "revenue" => Some(Metric::Revenue),
            "profit" => Some(Metric::Profit),
            "quantity" => Some(Metric::Quantity),
            "profit_margin" => Some(Metric::ProfitMargin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanParameters {
    #[serde(default, deserialize_with = "null_as_default")]
    pub filters: Map<String, Value>,
    #[serde(default, alias = "groupby", deserialize_with = "null_as_default")]
    pub group_by: Vec<String>,
    #[serde(default, deserialize_with = "lenient_metric")]
    pub metric: Option<Metric>,
    #[serde(default, deserialize_with = "lenient_top_n")]
    pub top_n: Option<u32>,
}

/// Ordered step identifiers plus the planner's metadata. Identifiers stay
/// plain strings so unknown ones survive until execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub intent: String,
    #[serde(alias = "agents")]
    pub steps: Vec<String>,
    #[serde(default, alias = "primary_agent")]
    pub primary_step: Option<String>,
    #[serde(default, deserialize_with = "lenient_complexity")]
    pub complexity: Complexity,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters: PlanParameters,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reasoning: String,
}

/// One prior conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

impl HistoryTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Per-step entry: the step's own output, or the invocation failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepRecord {
    Completed(StepOutput),
    Failed { error: String },
}

impl StepRecord {
    pub fn error(&self) -> Option<&str> {
        match self {
            StepRecord::Completed(out) => out.error.as_deref(),
            StepRecord::Failed { error } => Some(error),
        }
    }

    pub fn output(&self) -> Option<&StepOutput> {
        match self {
            StepRecord::Completed(out) => Some(out),
            StepRecord::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedResult {
    pub query: String,
    pub plan: Plan,
    pub final_data: Vec<Row>,
    pub final_columns: Vec<String>,
    pub report: Option<Report>,
    pub viz_config: Option<ChartConfig>,
    pub anomalies: Vec<Anomaly>,
    pub step_results: BTreeMap<String, StepRecord>,
    /// Most recent analytical-step failure.
    pub error: Option<String>,
}

impl AggregatedResult {
    pub fn new(query: &str, plan: Plan) -> Self {
        Self {
            query: query.to_string(),
            plan,
            final_data: Vec::new(),
            final_columns: Vec::new(),
            report: None,
            viz_config: None,
            anomalies: Vec::new(),
            step_results: BTreeMap::new(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Iterating,
    Completed,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::NotStarted => "not_started",
            RunState::Iterating => "iterating",
            RunState::Completed => "completed",
        }
    }
}

/// An explicit `null` reads the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_complexity<'de, D>(deserializer: D) -> Result<Complexity, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(Complexity::from_label)
        .unwrap_or_default())
}

fn lenient_metric<'de, D>(deserializer: D) -> Result<Option<Metric>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(Metric::from_label))
}

fn lenient_top_n<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
