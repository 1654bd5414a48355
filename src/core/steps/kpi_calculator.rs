use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::common::{context_suffix, contains_any, explain, generate_sql, head};
use super::{Step, StepFailure, StepId, StepOutput};
use crate::core::llm::LlmClient;
use crate::core::warehouse::Warehouse;
use crate::core::warehouse::schema::PROMPT_SCHEMA;

const SYSTEM_PROMPT: &str = "You are the KPI Calculator for an OLAP Business Intelligence system.
Compute business KPIs: YoY growth, MoM change, profit margins, rankings.

KPI FORMULAS:
  YoY Growth %  = (current_year_revenue - prev_year_revenue) / prev_year_revenue * 100
  MoM Change %  = (current_month - prev_month) / prev_month * 100
  Profit Margin = profit / revenue * 100
  Top N ranking = ORDER BY metric DESC LIMIT N

WINDOW FUNCTIONS available in SQLite:
  LAG(revenue) OVER (PARTITION BY region ORDER BY year)
  RANK() OVER (ORDER BY revenue DESC)
  ROW_NUMBER() OVER (...)

RULES:
1. For YoY use a self-join or the LAG window function.
2. ROUND all percentages to 2 decimal places.
3. Label growth columns clearly: yoy_growth_pct, mom_change_pct, etc.
4. For rankings include RANK() or ROW_NUMBER().
5. Return ONLY one SQLite statement. No markdown, no explanation.";

const EXPLAIN_PROMPT: &str = "You are a CFO-level analyst. Provide a 2-sentence insight about \
these KPI results. Be specific about numbers. No bullet points.";

const YOY_KEYWORDS: &[&str] = &[
    "year over year",
    "yoy",
    "compare year",
    "2022 vs 2023",
    "2023 vs 2024",
    "annual growth",
    "yearly",
];
const MOM_KEYWORDS: &[&str] = &["month over month", "mom", "monthly trend", "monthly change"];
const RANKING_KEYWORDS: &[&str] = &["top", "best", "worst", "ranking", "rank", "highest", "lowest"];
const MARGIN_KEYWORDS: &[&str] = &["margin", "profitability", "profit %"];

/// First matching KPI family wins, in YoY, MoM, ranking, margin order.
pub fn detect_kpi(request: &str) -> &'static str {
    let q = request.to_lowercase();
    if contains_any(&q, YOY_KEYWORDS) {
        "yoy_growth"
    } else if contains_any(&q, MOM_KEYWORDS) {
        "mom_change"
    } else if contains_any(&q, RANKING_KEYWORDS) {
        "ranking"
    } else if contains_any(&q, MARGIN_KEYWORDS) {
        "profit_margin"
    } else {
        "general_kpi"
    }
}

pub struct KpiCalculator {
    llm: Arc<LlmClient>,
    warehouse: Warehouse,
}

impl KpiCalculator {
    pub fn new(llm: Arc<LlmClient>, warehouse: Warehouse) -> Self {
        Self { llm, warehouse }
    }
}

#[async_trait]
impl Step for KpiCalculator {
    fn id(&self) -> StepId {
        StepId::KpiCalculator
    }

    fn name(&self) -> &'static str {
        "KPI Calculator"
    }

    async fn run(
        &self,
        request: &str,
        context: Option<&StepOutput>,
    ) -> anyhow::Result<StepOutput> {
        let kpi = detect_kpi(request);
        let system = format!("{SYSTEM_PROMPT}\n\n{PROMPT_SCHEMA}");
        let user = format!(
            "KPI type: {kpi}\nUser request: {request}{}\n\nGenerate the SQL:",
            context_suffix(context)
        );
        let sql = generate_sql(&self.llm, &system, &user).await?;

        let table = match self.warehouse.query_read_only(&sql).await {
            Ok(table) => table,
            Err(e) => {
                return Ok(StepOutput::failed(self.id(), kpi, StepFailure::from(e)).with_sql(sql));
            }
        };

        let explanation = explain(
            &self.llm,
            EXPLAIN_PROMPT,
            &format!(
                "KPI: {kpi}\nQuestion: {request}\nResults: {}",
                json!(head(&table.rows, 5))
            ),
            &table,
            "No KPI data available for this query.",
        )
        .await;

        let mut output = StepOutput::new(self.id(), kpi)
            .with_sql(sql)
            .with_table(table);
        output.explanation = explanation;
        Ok(output)
    }
}
