use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::common::{context_suffix, explain, generate_sql};
use super::{Step, StepFailure, StepId, StepOutput};
use crate::core::llm::LlmClient;
use crate::core::warehouse::Warehouse;
use crate::core::warehouse::schema::PROMPT_SCHEMA;

const OPERATION: &str = "drill_down_roll_up";

const SYSTEM_PROMPT: &str = "You are the Dimension Navigator for an OLAP Business Intelligence system.
Translate natural language drill-down and roll-up requests into SQLite SQL.

HIERARCHIES:
  Time:      year → quarter → month_name
  Geography: region → country
  Product:   category → subcategory

OPERATIONS:
  Drill-Down: group by a FINER level (e.g. year→quarter, region→country)
  Roll-Up:    group by a COARSER level (e.g. month→quarter, country→region)

RULES:
1. Always SUM revenue, profit, quantity; AVG profit_margin.
2. ROUND(..., 2) every numeric aggregate.
3. ORDER BY revenue DESC or by the grouping column.
4. Use WHERE clauses when the user names a dimension value.
5. Return ONLY one SQLite statement. No markdown, no explanation.";

const EXPLAIN_PROMPT: &str = "You are a BI analyst. Given a user question, SQL, and top result, \
write a concise 2-sentence business insight. No bullet points.";

pub struct DimensionNavigator {
    llm: Arc<LlmClient>,
    warehouse: Warehouse,
}

impl DimensionNavigator {
    pub fn new(llm: Arc<LlmClient>, warehouse: Warehouse) -> Self {
        Self { llm, warehouse }
    }
}

#[async_trait]
impl Step for DimensionNavigator {
    fn id(&self) -> StepId {
        StepId::DimensionNavigator
    }

    fn name(&self) -> &'static str {
        "Dimension Navigator"
    }

    async fn run(
        &self,
        request: &str,
        context: Option<&StepOutput>,
    ) -> anyhow::Result<StepOutput> {
        let system = format!("{SYSTEM_PROMPT}\n\n{PROMPT_SCHEMA}");
        let user = format!(
            "User request: {request}{}\n\nGenerate the SQL query:",
            context_suffix(context)
        );
        let sql = generate_sql(&self.llm, &system, &user).await?;

        let table = match self.warehouse.query_read_only(&sql).await {
            Ok(table) => table,
            Err(e) => {
                return Ok(
                    StepOutput::failed(self.id(), OPERATION, StepFailure::from(e)).with_sql(sql)
                );
            }
        };

        let top = table.rows.first().map(|r| json!(r)).unwrap_or_default();
        let explanation = explain(
            &self.llm,
            EXPLAIN_PROMPT,
            &format!(
                "Question: {request}\nSQL: {sql}\nTop result: {top}\nColumns: {:?}",
                table.columns
            ),
            &table,
            "No data found for this query.",
        )
        .await;

        let mut output = StepOutput::new(self.id(), OPERATION)
            .with_sql(sql)
            .with_table(table);
        output.explanation = explanation;
        Ok(output)
    }
}
