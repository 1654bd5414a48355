use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::common::{head, numeric_columns};
use super::{ChartConfig, Step, StepFailure, StepId, StepOutput};
use crate::core::llm::{LlmClient, strip_code_fences};

const OPERATION: &str = "chart_selection";

const SYSTEM_PROMPT: &str = r#"You are the Visualization agent for a BI platform.
Given a dataset (columns + sample rows) and the analytical context, decide the
BEST chart type and return a Plotly-compatible config.

OUTPUT FORMAT (strict JSON, no markdown):
{
  "chart_type": "bar" | "line" | "pie" | "scatter" | "heatmap" | "treemap",
  "title": "Chart title",
  "x_col": "column for x-axis",
  "y_col": "column for y-axis",
  "color_col": "optional grouping column or null",
  "orientation": "v" | "h",
  "rationale": "one sentence why this chart type"
}

RULES:
- Time series (year/month/quarter on x) → line chart
- Categorical comparisons → bar chart (horizontal if many categories)
- Part-of-whole (proportions) → pie chart
- Two numeric variables → scatter
- Matrix/cross-tab data → heatmap
- Hierarchical data → treemap
- Return ONLY valid JSON."#;

const TIME_COLUMNS: &[&str] = &["year", "quarter", "month", "month_name"];

/// Heuristic chart when the decision service gives no usable config: a line
/// over the first time column, otherwise bars over the first categorical one.
pub fn fallback_config(ctx: &StepOutput) -> ChartConfig {
    let columns = &ctx.columns;
    let numeric = numeric_columns(&ctx.data, columns);
    let time_col = columns.iter().find(|c| TIME_COLUMNS.contains(&c.as_str()));
    let category_col = columns.iter().find(|c| !numeric.contains(c));

    let x_col = time_col
        .or(category_col)
        .or(columns.first())
        .cloned()
        .unwrap_or_default();
    let y_col = if numeric.iter().any(|c| c == "revenue") {
        "revenue".to_string()
    } else {
        numeric
            .first()
            .or(columns.last())
            .cloned()
            .unwrap_or_default()
    };

    ChartConfig {
        chart_type: if time_col.is_some() { "line" } else { "bar" }.to_string(),
        title: "Analysis Results".to_string(),
        x_col,
        y_col,
        color_col: None,
        orientation: "v".to_string(),
        rationale: "Default configuration".to_string(),
    }
}

pub struct Visualization {
    llm: Arc<LlmClient>,
}

impl Visualization {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Step for Visualization {
    fn id(&self) -> StepId {
        StepId::Visualization
    }

    fn name(&self) -> &'static str {
        "Visualization"
    }

    async fn run(
        &self,
        request: &str,
        context: Option<&StepOutput>,
    ) -> anyhow::Result<StepOutput> {
        let Some(ctx) = context.filter(|c| c.has_data()) else {
            return Ok(StepOutput::failed(
                self.id(),
                OPERATION,
                StepFailure::NoData,
            ));
        };

        let raw = self
            .llm
            .complete(
                SYSTEM_PROMPT,
                &format!(
                    "Operation: {}\nQuestion: {request}\nColumns: {:?}\nSample rows: {}",
                    ctx.operation,
                    ctx.columns,
                    json!(head(&ctx.data, 3))
                ),
            )
            .await?;

        let config = serde_json::from_str::<ChartConfig>(strip_code_fences(&raw)).unwrap_or_else(|e| {
            warn!("Chart config was not valid JSON ({}), using heuristic", e);
            fallback_config(ctx)
        });

        let mut output = StepOutput::new(self.id(), OPERATION);
        output.config = Some(config);
        Ok(output)
    }
}
