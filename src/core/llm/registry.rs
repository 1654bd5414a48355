use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::LlmError;

const PROVIDERS_JSON: &str = include_str!("providers.json");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRegistry {
    pub providers: Vec<ProviderDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDef {
    pub id: String,
    pub name: String,
    pub api_format: ApiFormat,
    pub base_url: String,
    pub default_model: String,
    /// Environment variable holding the credential for this provider.
    pub api_key_env: String,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFormat {
    Openai,
    Anthropic,
}

impl ProviderRegistry {
    pub fn load() -> Self {
        serde_json::from_str(PROVIDERS_JSON).expect("providers.json is invalid")
    }

    pub fn get_provider(&self, id: &str) -> Option<&ProviderDef> {
        let normalized = id.trim().to_lowercase();
        self.providers
            .iter()
            .find(|p| p.id == normalized || p.name.to_lowercase() == normalized)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id.as_str()).collect()
    }
}

impl ProviderDef {
    /// Name of the variable that overrides `base_url`, e.g.
    /// `CUBEWISE_OPENAI_BASE_URL`.
    pub fn base_url_env(&self) -> String {
        format!("CUBEWISE_{}_BASE_URL", self.id.to_uppercase())
    }

    pub fn resolved_base_url(&self) -> String {
        std::env::var(self.base_url_env())
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.base_url.clone())
    }

    pub fn has_credential(&self) -> bool {
        self.credential().is_ok()
    }

    pub fn credential(&self) -> Result<String, LlmError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| LlmError::MissingCredential {
                provider: self.id.clone(),
                env_var: self.api_key_env.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_registry_has_the_four_providers() {
        let registry = ProviderRegistry::load();
        assert_eq!(
            registry.ids(),
            vec!["anthropic", "openai", "groq", "openrouter"]
        );
        let anthropic = registry.get_provider("Anthropic").unwrap();
        assert_eq!(anthropic.api_format, ApiFormat::Anthropic);
        assert_eq!(anthropic.api_key_env, "ANTHROPIC_API_KEY");
        assert_eq!(
            registry.get_provider(" GROQ ").unwrap().api_format,
            ApiFormat::Openai
        );
        assert!(registry.get_provider("mistral").is_none());
    }

    #[test]
    fn missing_credential_names_the_variable() {
        let def = ProviderDef {
            id: "ghost".to_string(),
            name: "Ghost".to_string(),
            api_format: ApiFormat::Openai,
            base_url: "http://localhost".to_string(),
            default_model: "m".to_string(),
            api_key_env: "CUBEWISE_TEST_SURELY_UNSET_KEY".to_string(),
            extra_headers: HashMap::new(),
        };
        match def.credential() {
            Err(LlmError::MissingCredential { env_var, .. }) => {
                assert_eq!(env_var, "CUBEWISE_TEST_SURELY_UNSET_KEY")
            }
            other => panic!("expected missing credential, got {:?}", other),
        }
        assert_eq!(def.base_url_env(), "CUBEWISE_GHOST_BASE_URL");
        assert_eq!(def.resolved_base_url(), "http://localhost");
    }
}
