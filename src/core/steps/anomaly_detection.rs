use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::common::{column_stats, head, numeric_columns};
use super::{Anomaly, Step, StepFailure, StepId, StepOutput};
use crate::core::llm::{LlmClient, strip_code_fences};
use crate::core::warehouse::{QueryResult, Warehouse};

const OPERATION: &str = "anomaly_detection";
const SAMPLE_ROWS: usize = 20;
const MAX_TOKENS: u32 = 1200;

const SYSTEM_PROMPT: &str = r#"You are the Anomaly Detection agent for a BI platform.
You will receive a data table summary. Look for:
1. Revenue/profit outliers (>2 std deviations from mean)
2. Negative profit margins
3. Sudden MoM or YoY drops/spikes (>30% change)
4. Underperforming segments (bottom 10%)
5. Zero or near-zero revenue periods

OUTPUT FORMAT (strict JSON, no markdown):
{
  "anomalies": [
    {
      "type": "outlier" | "drop" | "spike" | "negative_margin" | "underperformer",
      "description": "what was found",
      "dimension": "which column/dimension is affected",
      "value": "the anomalous value",
      "severity": "low" | "medium" | "high"
    }
  ],
  "summary": "1-2 sentence overall assessment"
}

Return ONLY valid JSON."#;

/// Aggregate analysed when no previous result is available.
pub const BASELINE_SQL: &str = "\
SELECT year, quarter, region, category,
       ROUND(SUM(revenue), 2) AS total_revenue,
       ROUND(SUM(profit), 2) AS total_profit,
       ROUND(AVG(profit_margin), 2) AS avg_margin,
       COUNT(*) AS transactions
FROM fact_sales
GROUP BY year, quarter, region, category
ORDER BY year, quarter, region, category";

pub const UNPARSED_SUMMARY: &str = "Could not parse anomaly results. Check the raw data manually.";

#[derive(Debug, Deserialize)]
struct Findings {
    #[serde(default)]
    anomalies: Vec<Anomaly>,
    #[serde(default)]
    summary: String,
}

fn parse_findings(raw: &str) -> Option<Findings> {
    serde_json::from_str(strip_code_fences(raw)).ok()
}

/// Shape, per-column statistics and a sample of the table under analysis.
pub fn stats_summary(table: &QueryResult) -> serde_json::Value {
    let numeric_stats: BTreeMap<String, _> = numeric_columns(&table.rows, &table.columns)
        .into_iter()
        .filter_map(|col| column_stats(&table.rows, &col).map(|s| (col, s)))
        .collect();
    json!({
        "shape": [table.rows.len(), table.columns.len()],
        "numeric_stats": numeric_stats,
        "sample": head(&table.rows, SAMPLE_ROWS),
    })
}

pub struct AnomalyDetection {
    llm: Arc<LlmClient>,
    warehouse: Warehouse,
}

impl AnomalyDetection {
    pub fn new(llm: Arc<LlmClient>, warehouse: Warehouse) -> Self {
        Self { llm, warehouse }
    }
}

#[async_trait]
impl Step for AnomalyDetection {
    fn id(&self) -> StepId {
        StepId::AnomalyDetection
    }

    fn name(&self) -> &'static str {
        "Anomaly Detection"
    }

    async fn run(
        &self,
        request: &str,
        context: Option<&StepOutput>,
    ) -> anyhow::Result<StepOutput> {
        let table = match context.filter(|c| c.has_data()) {
            Some(ctx) => QueryResult {
                columns: ctx.columns.clone(),
                rows: ctx.data.clone(),
            },
            None => match self.warehouse.query_read_only(BASELINE_SQL).await {
                Ok(table) => table,
                Err(e) => {
                    return Ok(StepOutput::failed(self.id(), OPERATION, StepFailure::from(e))
                        .with_sql(BASELINE_SQL));
                }
            },
        };

        let summary = serde_json::to_string_pretty(&stats_summary(&table))?;
        let raw = self
            .llm
            .complete_with_limit(
                SYSTEM_PROMPT,
                &format!("Question: {request}\n\nData summary:\n{summary}"),
                MAX_TOKENS,
            )
            .await?;

        let findings = parse_findings(&raw).unwrap_or_else(|| {
            warn!("Anomaly findings were not valid JSON, reporting none");
            Findings {
                anomalies: Vec::new(),
                summary: UNPARSED_SUMMARY.to_string(),
            }
        });

        let mut output = StepOutput::new(self.id(), OPERATION).with_table(table);
        output.anomalies = findings.anomalies;
        output.summary = Some(findings.summary);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::llm::testing::{ScriptedProvider, client};

    const FINDINGS: &str = r#"```json
{"anomalies": [{"type": "drop", "description": "Q1 revenue fell 40%", "dimension": "quarter", "value": "Q1", "severity": "high"}],
 "summary": "One sharp drop."}
```"#;

    #[tokio::test]
    async fn analyses_context_rows_when_present() {
        let provider = Arc::new(ScriptedProvider::replying(FINDINGS));
        let step = AnomalyDetection::new(
            Arc::new(client(provider.clone())),
            Warehouse::in_memory().unwrap(),
        );
        let mut ctx = StepOutput::new(StepId::CubeOperations, "slice");
        ctx.columns = vec!["quarter".to_string(), "revenue".to_string()];
        ctx.data = serde_json::from_value(json!([
            {"quarter": "Q1", "revenue": 60.0},
            {"quarter": "Q2", "revenue": 100.0}
        ]))
        .unwrap();

        let out = step.run("anything unusual?", Some(&ctx)).await.unwrap();
        assert_eq!(out.anomalies.len(), 1);
        assert_eq!(out.anomalies[0].kind, "drop");
        assert_eq!(out.summary.as_deref(), Some("One sharp drop."));
        assert_eq!(out.data, ctx.data);
        assert_eq!(out.row_count, 2);

        let prompt = &provider.seen.lock().unwrap()[0][1].content;
        assert!(prompt.contains("\"shape\""));
        assert!(prompt.contains("\"revenue\""));
    }

    #[tokio::test]
    async fn falls_back_to_baseline_aggregate_and_tolerates_bad_json() {
        let wh = Warehouse::in_memory().unwrap();
        wh.seed(100, 42).await.unwrap();
        let provider = Arc::new(ScriptedProvider::replying("not json at all"));
        let step = AnomalyDetection::new(Arc::new(client(provider)), wh);

        let out = step.run("find anomalies", None).await.unwrap();
        assert!(out.anomalies.is_empty());
        assert_eq!(out.summary.as_deref(), Some(UNPARSED_SUMMARY));
        assert!(out.columns.contains(&"total_revenue".to_string()));
        assert!(out.has_data());
        assert!(out.error.is_none());
    }

    #[test]
    fn one_incomplete_anomaly_keeps_the_rest() {
        let findings = parse_findings(
            r#"{"anomalies": [
                {"type": "spike", "dimension": "month"},
                {"type": "drop", "description": "APAC fell 30%", "severity": "medium"}
            ], "summary": "Two findings."}"#,
        )
        .unwrap();
        assert_eq!(findings.anomalies.len(), 2);
        assert!(findings.anomalies[0].description.is_empty());
        assert_eq!(findings.anomalies[1].description, "APAC fell 30%");
        assert_eq!(findings.summary, "Two findings.");
    }

    #[test]
    fn summary_reports_shape_and_numeric_stats() {
        let table = QueryResult {
            columns: vec!["region".to_string(), "revenue".to_string()],
            rows: serde_json::from_value(json!([
                {"region": "Europe", "revenue": 1.0},
                {"region": "Asia Pacific", "revenue": 3.0}
            ]))
            .unwrap(),
        };
        let summary = stats_summary(&table);
        assert_eq!(summary["shape"], json!([2, 2]));
        assert_eq!(summary["numeric_stats"]["revenue"]["mean"], json!(2.0));
        assert!(summary["numeric_stats"].get("region").is_none());
    }
}
