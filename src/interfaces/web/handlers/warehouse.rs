use axum::{Json, extract::State};

use super::super::AppState;
use super::ApiError;
use crate::core::warehouse::{DDL, Overview};

#[derive(serde::Deserialize)]
pub struct SqlRequest {
    pub sql: String,
}

/// Read-only SQL for power users. Every failure is the caller's problem (400).
pub async fn run_sql(
    State(state): State<AppState>,
    Json(req): Json<SqlRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = state
        .warehouse
        .query_read_only(&req.sql)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(serde_json::json!({
        "row_count": result.rows.len(),
        "data": result.rows,
        "columns": result.columns,
    })))
}

pub async fn get_schema(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let schema = state.warehouse.schema_info().await?;
    Ok(Json(serde_json::json!({ "schema": schema, "ddl": DDL })))
}

pub async fn get_overview(State(state): State<AppState>) -> Result<Json<Overview>, ApiError> {
    Ok(Json(state.warehouse.overview().await?))
}
