use axum::{Json, extract::State};
use tracing::{info, warn};

use super::super::AppState;
use super::ApiError;
use crate::core::orchestrator::{AggregatedResult, HistoryTurn};

fn default_provider() -> String {
    "anthropic".to_string()
}

#[derive(serde::Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
}

pub async fn run_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<AggregatedResult>, ApiError> {
    if req.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query cannot be empty".to_string()));
    }

    let orchestrator = state.cache.get_or_create(&req.provider).await?;
    info!("Query via '{}': {}", req.provider, req.query);

    match tokio::time::timeout(
        state.request_timeout,
        orchestrator.execute(&req.query, &req.history),
    )
    .await
    {
        Ok(result) => Ok(Json(result)),
        Err(_) => {
            warn!(
                "Query timed out after {}s: {}",
                state.request_timeout.as_secs(),
                req.query
            );
            Err(ApiError::Timeout(state.request_timeout.as_secs()))
        }
    }
}
