use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::common::{context_suffix, contains_any, explain, generate_sql, head};
use super::{Step, StepFailure, StepId, StepOutput};
use crate::core::llm::LlmClient;
use crate::core::warehouse::Warehouse;
use crate::core::warehouse::schema::PROMPT_SCHEMA;

const SYSTEM_PROMPT: &str = "You are the Cube Operations agent for an OLAP Business Intelligence system.
Translate Slice, Dice, and Pivot requests into SQLite SQL.

DIMENSION VALUES (exact strings):
  year: 2022, 2023, 2024
  quarter: 'Q1','Q2','Q3','Q4'
  region: 'North America','Europe','Asia Pacific','Latin America'
  category: 'Electronics','Furniture','Office Supplies','Clothing'
  customer_segment: 'Consumer','Corporate','Small Business','Government'

OPERATIONS:
  Slice: filter on ONE dimension (single WHERE condition)
  Dice:  filter on MULTIPLE dimensions (several WHERE conditions)
  Pivot: conditional aggregation (SUM(CASE WHEN ... END)) to rotate

RULES:
1. Always SUM revenue, profit, quantity; AVG profit_margin for aggregates.
2. ROUND all numeric aggregates to 2 decimal places.
3. For pivots use SUM(CASE WHEN col = val THEN revenue ELSE 0 END) AS \"val\".
4. Return ONLY one SQLite statement. No markdown, no explanation.";

const EXPLAIN_PROMPT: &str =
    "You are a BI analyst. Write 2 concise business insight sentences. No bullet points.";

const PIVOT_KEYWORDS: &[&str] = &["pivot", "as column", "rotate"];
const FILTER_KEYWORDS: &[&str] = &["and", "both", "filter", "where", "in", "for", "only"];

/// Picks slice, dice or pivot from the wording of the request.
pub fn detect_operation(request: &str) -> &'static str {
    let q = request.to_lowercase();
    if contains_any(&q, PIVOT_KEYWORDS) {
        return "pivot";
    }
    let hits = FILTER_KEYWORDS.iter().filter(|k| q.contains(*k)).count();
    if hits >= 2 { "dice" } else { "slice" }
}

pub struct CubeOperations {
    llm: Arc<LlmClient>,
    warehouse: Warehouse,
}

impl CubeOperations {
    pub fn new(llm: Arc<LlmClient>, warehouse: Warehouse) -> Self {
        Self { llm, warehouse }
    }
}

#[async_trait]
impl Step for CubeOperations {
    fn id(&self) -> StepId {
        StepId::CubeOperations
    }

    fn name(&self) -> &'static str {
        "Cube Operations"
    }

    async fn run(
        &self,
        request: &str,
        context: Option<&StepOutput>,
    ) -> anyhow::Result<StepOutput> {
        let operation = detect_operation(request);
        let system = format!("{SYSTEM_PROMPT}\n\n{PROMPT_SCHEMA}");
        let user = format!(
            "Operation type: {operation}\nUser request: {request}{}\n\nGenerate the SQL:",
            context_suffix(context)
        );
        let sql = generate_sql(&self.llm, &system, &user).await?;

        let table = match self.warehouse.query_read_only(&sql).await {
            Ok(table) => table,
            Err(e) => {
                return Ok(
                    StepOutput::failed(self.id(), operation, StepFailure::from(e)).with_sql(sql)
                );
            }
        };

        let explanation = explain(
            &self.llm,
            EXPLAIN_PROMPT,
            &format!(
                "OLAP Operation: {operation}\nQuestion: {request}\nTop rows: {}",
                json!(head(&table.rows, 3))
            ),
            &table,
            "No data matched the filter criteria.",
        )
        .await;

        let mut output = StepOutput::new(self.id(), operation)
            .with_sql(sql)
            .with_table(table);
        output.explanation = explanation;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::llm::testing::{ScriptedProvider, client};
    use crate::core::llm::{LlmError, testing::rate_limited};

    #[test]
    fn operation_detection() {
        assert_eq!(detect_operation("Pivot revenue by region"), "pivot");
        assert_eq!(
            detect_operation("Show revenue by region as columns, with years as rows"),
            "pivot"
        );
        assert_eq!(
            detect_operation("Show Electronics sales in Europe for 2024"),
            "dice"
        );
        assert_eq!(detect_operation("Q4 2024 sales"), "slice");
    }

    #[tokio::test]
    async fn empty_result_skips_explanation_call() {
        let wh = Warehouse::in_memory().unwrap();
        let provider = Arc::new(ScriptedProvider::replying(
            "SELECT region, SUM(revenue) AS revenue FROM fact_sales WHERE year = 1999 GROUP BY region",
        ));
        let step = CubeOperations::new(Arc::new(client(provider.clone())), wh);

        let out = step.run("Show only 1999 sales", None).await.unwrap();
        assert_eq!(out.operation, "slice");
        assert!(out.error.is_none());
        assert_eq!(out.row_count, 0);
        assert_eq!(
            out.explanation.as_deref(),
            Some("No data matched the filter criteria.")
        );
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn generated_writes_are_refused_and_leave_the_cube_intact() {
        let wh = Warehouse::in_memory().unwrap();
        wh.seed(100, 11).await.unwrap();
        let provider = Arc::new(ScriptedProvider::replying("DELETE FROM fact_sales"));
        let step = CubeOperations::new(Arc::new(client(provider.clone())), wh.clone());

        let out = step.run("Clear Q4 sales", None).await.unwrap();
        assert!(out.error.is_some());
        assert_eq!(out.sql.as_deref(), Some("DELETE FROM fact_sales"));
        assert_eq!(wh.fact_count().await.unwrap(), 100);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn decision_service_failure_is_an_invocation_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(rate_limited()),
            Err(rate_limited()),
            Err(rate_limited()),
        ]));
        let step = CubeOperations::new(
            Arc::new(client(provider.clone())),
            Warehouse::in_memory().unwrap(),
        );

        let err = step.run("Q4 only", None).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LlmError>(),
            Some(LlmError::RetriesExhausted { .. })
        ));
    }
}
