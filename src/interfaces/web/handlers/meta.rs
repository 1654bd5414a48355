use axum::Json;

/// Sample questions, one per kind of cube operation.
pub const EXAMPLE_QUERIES: [(&str, &str); 10] = [
    ("Slice", "Show only Q4 2024 sales"),
    ("Dice", "Show Electronics sales in Europe for 2024"),
    (
        "Drill-Down",
        "Break down 2024 revenue by quarter, then drill into Q4 by month",
    ),
    ("Roll-Up", "Roll up monthly sales to quarterly totals by region"),
    ("YoY Growth", "Compare 2023 vs 2024 revenue by region"),
    ("Top-N", "Top 5 countries by profit in 2024"),
    ("Pivot", "Show revenue by region as columns, with years as rows"),
    (
        "Anomaly",
        "Find unusual patterns or anomalies in our sales data",
    ),
    (
        "Profit Analysis",
        "Which category has the highest profit margin?",
    ),
    (
        "Complex",
        "Break down Q4 sales by region, then drill into the top performer by month",
    ),
];

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "cubewise is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn get_examples() -> Json<serde_json::Value> {
    let examples: Vec<serde_json::Value> = EXAMPLE_QUERIES
        .iter()
        .map(|(operation, query)| serde_json::json!({ "operation": operation, "query": query }))
        .collect();
    Json(serde_json::json!({ "examples": examples }))
}
