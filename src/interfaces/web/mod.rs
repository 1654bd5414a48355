mod handlers;
mod router;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::core::orchestrator::OrchestratorCache;
use crate::core::warehouse::Warehouse;

use router::build_api_router;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) cache: Arc<OrchestratorCache>,
    pub(crate) warehouse: Warehouse,
    pub(crate) log_tx: broadcast::Sender<String>,
    pub(crate) request_timeout: Duration,
    pub(crate) api_port: u16,
}

impl AppState {
    pub(crate) fn new(
        cache: Arc<OrchestratorCache>,
        warehouse: Warehouse,
        log_tx: broadcast::Sender<String>,
        request_timeout: Duration,
        api_port: u16,
    ) -> Self {
        Self {
            cache,
            warehouse,
            log_tx,
            request_timeout,
            api_port,
        }
    }
}

pub struct ApiServer {
    state: AppState,
    addr: String,
}

impl ApiServer {
    pub(crate) fn new(state: AppState, addr: String) -> Self {
        Self { state, addr }
    }

    /// Serves until Ctrl+C, then drains in-flight requests.
    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.addr))?;
        info!("API Server running at http://{}", self.addr);

        axum::serve(listener, build_api_router(self.state))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
            .context("API Server crashed")?;

        info!("API Server shutting down...");
        Ok(())
    }
}

// --- SSE Logs (used by router) ---

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(log) => Ok(Event::default().data(log)),
        Err(_) => Ok(Event::default().data("Log stream lagged")),
    });

    Sse::new(stream)
}
