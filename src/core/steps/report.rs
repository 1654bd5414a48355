use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::common::{column_stats, head, numeric_columns};
use super::{FormattingHints, Report, Step, StepId, StepOutput};
use crate::core::llm::{LlmClient, strip_code_fences};

const OPERATION: &str = "report_generation";
const MAX_TOKENS: u32 = 1000;

const SYSTEM_PROMPT: &str = r#"You are the Report Generator for an OLAP Business Intelligence platform.
Turn raw analytical results into a polished business report.

You receive the user's question, the OLAP operation performed and a data
summary (top rows + statistics). Produce a JSON object with EXACTLY these keys:
{
  "executive_summary": "2-3 sentence high-level finding for C-suite",
  "key_insights": ["insight 1", "insight 2", "insight 3"],
  "formatting_hints": {
    "highlight_column": "column name to highlight",
    "highlight_condition": "top" | "bottom" | "none",
    "chart_type": "bar" | "line" | "pie" | "table",
    "chart_x": "column for x-axis",
    "chart_y": "column for y-axis (numeric)"
  },
  "follow_up_questions": ["question 1", "question 2", "question 3"]
}

RULES:
1. Return ONLY valid JSON. No markdown, no extra text.
2. Be specific and data-driven (mention actual numbers).
3. chart_type: 'line' for time trends, 'bar' for comparisons, 'pie' for proportions.
4. follow_up_questions must be natural language business questions."#;

pub fn empty_report() -> Report {
    Report {
        executive_summary: "No data available to generate report.".to_string(),
        key_insights: Vec::new(),
        formatting_hints: FormattingHints {
            chart_type: Some("table".to_string()),
            ..Default::default()
        },
        follow_up_questions: Vec::new(),
    }
}

/// Deterministic report used when the decision service returns something
/// that is not a report.
pub fn fallback_report(request: &str, row_count: usize, columns: &[String]) -> Report {
    let chart_y = if columns.iter().any(|c| c == "revenue") {
        "revenue".to_string()
    } else {
        columns.last().cloned().unwrap_or_default()
    };
    Report {
        executive_summary: format!(
            "Analysis completed: {row_count} rows returned for '{request}'."
        ),
        key_insights: vec![
            format!("Data contains {row_count} records."),
            "See table for details.".to_string(),
        ],
        formatting_hints: FormattingHints {
            highlight_column: Some(String::new()),
            highlight_condition: Some("none".to_string()),
            chart_type: Some("bar".to_string()),
            chart_x: Some(columns.first().cloned().unwrap_or_default()),
            chart_y: Some(chart_y),
        },
        follow_up_questions: vec![
            "Can you break this down further?".to_string(),
            "What is the year-over-year growth?".to_string(),
            "Which segment performs best?".to_string(),
        ],
    }
}

pub struct ReportGenerator {
    llm: Arc<LlmClient>,
}

impl ReportGenerator {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Step for ReportGenerator {
    fn id(&self) -> StepId {
        StepId::Report
    }

    fn name(&self) -> &'static str {
        "Report Generator"
    }

    async fn run(
        &self,
        request: &str,
        context: Option<&StepOutput>,
    ) -> anyhow::Result<StepOutput> {
        let mut output = StepOutput::new(self.id(), OPERATION);
        let Some(ctx) = context.filter(|c| c.has_data()) else {
            output.report = Some(empty_report());
            return Ok(output);
        };

        let statistics: BTreeMap<String, _> = numeric_columns(&ctx.data, &ctx.columns)
            .into_iter()
            .filter_map(|col| {
                column_stats(&ctx.data, &col).map(|s| {
                    let view = json!({"sum": s.sum, "mean": s.mean, "max": s.max, "min": s.min});
                    (col, view)
                })
            })
            .collect();
        let summary = json!({
            "question": request,
            "operation": ctx.operation,
            "step": ctx.step,
            "total_rows": ctx.data.len(),
            "columns": ctx.columns,
            "top_5_rows": head(&ctx.data, 5),
            "statistics": statistics,
        });

        let raw = self
            .llm
            .complete_with_limit(
                SYSTEM_PROMPT,
                &format!(
                    "Analysis summary:\n{}",
                    serde_json::to_string_pretty(&summary)?
                ),
                MAX_TOKENS,
            )
            .await?;

        let report = serde_json::from_str::<Report>(strip_code_fences(&raw)).unwrap_or_else(|e| {
            warn!("Report was not valid JSON ({}), using fallback report", e);
            fallback_report(request, ctx.data.len(), &ctx.columns)
        });
        output.report = Some(report);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::llm::testing::{ScriptedProvider, client};

    fn context() -> StepOutput {
        let mut ctx = StepOutput::new(StepId::KpiCalculator, "ranking");
        ctx.columns = vec!["country".to_string(), "profit".to_string()];
        ctx.data = serde_json::from_value(json!([
            {"country": "Germany", "profit": 120.0},
            {"country": "Japan", "profit": 80.0}
        ]))
        .unwrap();
        ctx
    }

    #[tokio::test]
    async fn no_context_yields_empty_report_without_calling_out() {
        let provider = Arc::new(ScriptedProvider::replying("{}"));
        let step = ReportGenerator::new(Arc::new(client(provider.clone())));

        let out = step.run("anything", None).await.unwrap();
        assert_eq!(out.report, Some(empty_report()));
        assert!(out.error.is_none());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn parses_fenced_report() {
        let provider = Arc::new(ScriptedProvider::replying(
            "```json\n{\"executive_summary\": \"Germany leads.\", \"key_insights\": [\"Germany 120\"], \
             \"formatting_hints\": {\"chart_type\": \"bar\", \"chart_x\": \"country\", \"chart_y\": \"profit\"}, \
             \"follow_up_questions\": [\"Why Japan?\"]}\n```",
        ));
        let step = ReportGenerator::new(Arc::new(client(provider.clone())));

        let out = step.run("top countries", Some(&context())).await.unwrap();
        let report = out.report.unwrap();
        assert_eq!(report.executive_summary, "Germany leads.");
        assert_eq!(report.formatting_hints.chart_y.as_deref(), Some("profit"));

        let prompt = &provider.seen.lock().unwrap()[0][1].content;
        assert!(prompt.contains("\"statistics\""));
        assert!(prompt.contains("\"sum\": 200.0"));
    }

    #[tokio::test]
    async fn unparseable_reply_uses_fallback() {
        let provider = Arc::new(ScriptedProvider::replying("Germany is great"));
        let step = ReportGenerator::new(Arc::new(client(provider)));

        let out = step.run("top countries", Some(&context())).await.unwrap();
        let report = out.report.unwrap();
        assert_eq!(
            report.executive_summary,
            "Analysis completed: 2 rows returned for 'top countries'."
        );
        assert_eq!(report.formatting_hints.chart_x.as_deref(), Some("country"));
        assert_eq!(report.formatting_hints.chart_y.as_deref(), Some("profit"));
    }
}
