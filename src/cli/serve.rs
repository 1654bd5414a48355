use std::sync::Arc;

use anyhow::Result;
use console::style;

use crate::core::config::AppConfig;
use crate::core::orchestrator::{OrchestratorCache, ProviderOrchestratorFactory};
use crate::core::llm::registry::ProviderRegistry;
use crate::core::terminal::{self, GuideSection, print_warn};
use crate::interfaces::web::{ApiServer, AppState};
use crate::logging;

pub(super) async fn run(config: AppConfig) -> Result<()> {
    let log_tx = logging::init(config.log_filter.as_deref(), false);
    let warehouse = super::open_warehouse(&config).await?;

    let factory = ProviderOrchestratorFactory::new(warehouse.clone(), config.llm.clone());
    let cache = Arc::new(OrchestratorCache::new(Arc::new(factory)));
    let state = AppState::new(
        cache,
        warehouse,
        log_tx,
        config.request_timeout(),
        config.api_port,
    );

    GuideSection::new("API Server")
        .status(
            "Endpoint",
            &format!(
                "{}",
                style(format!("http://{}", config.bind_addr()))
                    .underlined()
                    .cyan()
            ),
        )
        .status(
            "Warehouse",
            &config
                .db_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "in-memory".to_string()),
        )
        .status(
            "Request timeout",
            &format!("{}s", config.request_timeout_secs),
        )
        .blank()
        .hint("Press Ctrl+C to stop the server.")
        .print();
    println!();

    let registry = ProviderRegistry::load();
    tracing::info!("Providers available: {}", registry.ids().join(", "));
    if !registry.providers.iter().any(|p| p.has_credential()) {
        print_warn("No provider credential is set. /api/query will answer 400 until one is exported.");
        println!();
    }

    ApiServer::new(state, config.bind_addr()).run().await?;
    terminal::print_goodbye();
    Ok(())
}
