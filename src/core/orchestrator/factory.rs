use std::sync::Arc;

use super::cache::{OrchestratorFactory, ProviderError};
use super::executor::Orchestrator;
use super::planner::PlanGenerator;
use crate::core::config::LlmSettings;
use crate::core::llm::generic_provider::GenericProvider;
use crate::core::llm::registry::{ProviderDef, ProviderRegistry};
use crate::core::llm::{LlmClient, log_provider_ready};
use crate::core::steps::StepRegistry;
use crate::core::warehouse::Warehouse;

/// Builds orchestrators backed by the embedded provider registry, reading
/// credentials from the process environment.
pub struct ProviderOrchestratorFactory {
    registry: ProviderRegistry,
    warehouse: Warehouse,
    settings: LlmSettings,
}

impl ProviderOrchestratorFactory {
    pub fn new(warehouse: Warehouse, settings: LlmSettings) -> Self {
        Self {
            registry: ProviderRegistry::load(),
            warehouse,
            settings,
        }
    }

    fn provider(&self, id: &str) -> Result<&ProviderDef, ProviderError> {
        self.registry
            .get_provider(id)
            .ok_or_else(|| ProviderError::UnknownProvider(id.to_string()))
    }

    /// One client shared by the planner and every step.
    pub fn client(&self, id: &str) -> Result<LlmClient, ProviderError> {
        let def = self.provider(id)?;
        let provider = GenericProvider::new(def.clone(), credential(def)?);
        let client = LlmClient::new(Arc::new(provider), self.settings.model_for(def))
            .with_retry(self.settings.retry_policy())
            .with_max_tokens(self.settings.max_tokens);
        log_provider_ready(&client);
        Ok(client)
    }
}

fn credential(def: &ProviderDef) -> Result<String, ProviderError> {
    def.credential()
        .map_err(|_| ProviderError::MissingCredential {
            provider: def.id.clone(),
            env_var: def.api_key_env.clone(),
        })
}

impl OrchestratorFactory for ProviderOrchestratorFactory {
    fn validate(&self, provider: &str) -> Result<(), ProviderError> {
        credential(self.provider(provider)?).map(|_| ())
    }

    fn build(&self, provider: &str) -> Result<Orchestrator, ProviderError> {
        let llm = Arc::new(self.client(provider)?);
        Ok(Orchestrator::new(
            PlanGenerator::new(llm.clone()),
            StepRegistry::standard(llm, self.warehouse.clone()),
        ))
    }
}
