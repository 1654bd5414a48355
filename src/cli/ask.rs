use anyhow::{Context, Result};

use super::AskCommandArgs;
use crate::core::config::AppConfig;
use crate::core::orchestrator::{OrchestratorFactory, ProviderOrchestratorFactory};
use crate::logging;

/// One pipeline run. Stdout carries only the JSON result.
pub(super) async fn run(config: AppConfig, args: AskCommandArgs) -> Result<()> {
    logging::init(config.log_filter.as_deref(), true);

    let factory = ProviderOrchestratorFactory::new(
        super::open_warehouse(&config).await?,
        config.llm.clone(),
    );
    factory.validate(&args.provider)?;
    let orchestrator = factory.build(&args.provider)?;

    let result = tokio::time::timeout(
        config.request_timeout(),
        orchestrator.execute(&args.query, &[]),
    )
    .await
    .with_context(|| {
        format!(
            "query did not finish within {}s",
            config.request_timeout_secs
        )
    })?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
