//! Helpers shared by the concrete steps: SQL generation, explanations,
//! column statistics and keyword detection.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

use super::StepOutput;
use crate::core::llm::{LlmClient, LlmError, strip_code_fences};
use crate::core::warehouse::{QueryResult, Row};

/// Rows of the previous result forwarded to the decision service.
const CONTEXT_SAMPLE_ROWS: usize = 5;

pub fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Renders the rolling context as a prompt suffix, or nothing when absent.
pub fn context_suffix(context: Option<&StepOutput>) -> String {
    let Some(ctx) = context else {
        return String::new();
    };
    let view = json!({
        "step": ctx.step,
        "operation": ctx.operation,
        "sql": ctx.sql,
        "columns": ctx.columns,
        "row_count": ctx.row_count,
        "sample": ctx.data.iter().take(CONTEXT_SAMPLE_ROWS).collect::<Vec<_>>(),
    });
    format!("\nPrevious context: {}", view)
}

/// Asks for a single SQL statement and strips any fence around it.
pub async fn generate_sql(llm: &LlmClient, system: &str, user: &str) -> Result<String, LlmError> {
    let raw = llm.complete(system, user).await?;
    Ok(strip_code_fences(&raw).trim_end_matches(';').trim().to_string())
}

/// Short narrative for a result table. Empty tables get `empty_message`
/// without a round trip; decision-service failures degrade to `None`.
pub async fn explain(
    llm: &LlmClient,
    system: &str,
    user: &str,
    table: &QueryResult,
    empty_message: &str,
) -> Option<String> {
    if table.is_empty() {
        return Some(empty_message.to_string());
    }
    match llm.complete(system, user).await {
        Ok(text) => Some(text.trim().to_string()),
        Err(e) => {
            warn!("Explanation unavailable: {}", e);
            None
        }
    }
}

pub fn head(rows: &[Row], n: usize) -> Vec<&Row> {
    rows.iter().take(n).collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Columns whose non-null values are all numbers, in column order.
pub fn numeric_columns(rows: &[Row], columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|col| {
            let mut seen = false;
            for row in rows {
                match row.get(col.as_str()) {
                    Some(Value::Number(_)) => seen = true,
                    None | Some(Value::Null) => {}
                    Some(_) => return false,
                }
            }
            seen
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Sample statistics for one numeric column, rounded to two decimals.
pub fn column_stats(rows: &[Row], column: &str) -> Option<ColumnStats> {
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|r| r.get(column).and_then(Value::as_f64))
        .collect();
    if values.is_empty() {
        return None;
    }
    let count = values.len();
    let sum: f64 = values.iter().sum();
    let mean = sum / count as f64;
    let std = if count > 1 {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        var.sqrt()
    } else {
        0.0
    };
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(ColumnStats {
        count,
        sum: round2(sum),
        mean: round2(mean),
        std: round2(std),
        min: round2(min),
        max: round2(max),
    })
}
