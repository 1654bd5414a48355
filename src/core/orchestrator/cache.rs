use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use super::executor::Orchestrator;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("{env_var} not set. Export it to use the '{provider}' provider.")]
    MissingCredential { provider: String, env_var: String },
}

/// Builds orchestrators for a provider key. `validate` runs on every request
/// so a credential removed after the first build is still reported.
pub trait OrchestratorFactory: Send + Sync {
    fn validate(&self, provider: &str) -> Result<(), ProviderError>;

    fn build(&self, provider: &str) -> Result<Orchestrator, ProviderError>;
}

/// One orchestrator per provider key, created on first use.
pub struct OrchestratorCache {
    factory: Arc<dyn OrchestratorFactory>,
    entries: Mutex<HashMap<String, Arc<Orchestrator>>>,
}

impl OrchestratorCache {
    pub fn new(factory: Arc<dyn OrchestratorFactory>) -> Self {
        Self {
            factory,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, provider: &str) -> Result<Arc<Orchestrator>, ProviderError> {
        let key = provider.trim().to_lowercase();
        self.factory.validate(&key)?;

        // Held across check-then-create so concurrent callers build at most once.
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.get(&key) {
            return Ok(existing.clone());
        }
        let orchestrator = Arc::new(self.factory.build(&key)?);
        entries.insert(key.clone(), orchestrator.clone());
        info!(
            "Orchestrator created for provider '{}' with {} steps",
            key,
            orchestrator.steps().len()
        );
        Ok(orchestrator)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
