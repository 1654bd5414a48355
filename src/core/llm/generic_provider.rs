use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::registry::{ApiFormat, ProviderDef};
use super::{ChatMessage, LlmError, LlmProvider};

// ── OpenAI-compatible request/response ──

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<OpenAiMessage<'a>>,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessageOwned,
}

#[derive(Deserialize)]
struct OpenAiMessageOwned {
    content: Option<String>,
}

// ── Anthropic messages request/response ──

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<OpenAiMessage<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

// ── Generic Provider ──

pub struct GenericProvider {
    provider_def: ProviderDef,
    api_key: String,
    base_url: String,
    client: Client,
}

impl GenericProvider {
    pub fn new(provider_def: ProviderDef, api_key: String) -> Self {
        let base_url = provider_def.resolved_base_url();
        Self {
            provider_def,
            api_key,
            base_url,
            client: Client::new(),
        }
    }

    fn network_error(&self, e: reqwest::Error) -> LlmError {
        LlmError::Network {
            provider: self.provider_def.id.clone(),
            message: e.to_string(),
        }
    }

    fn parse_error(&self, e: reqwest::Error) -> LlmError {
        LlmError::Parse {
            provider: self.provider_def.id.clone(),
            message: e.to_string(),
        }
    }

    async fn send<T: Serialize>(&self, body: &T) -> Result<reqwest::Response, LlmError> {
        let mut request = self.client.post(&self.base_url).json(body);
        request = match self.provider_def.api_format {
            ApiFormat::Openai => {
                request.header("Authorization", format!("Bearer {}", self.api_key))
            }
            ApiFormat::Anthropic => request.header("x-api-key", &self.api_key),
        };
        for (name, value) in &self.provider_def.extra_headers {
            request = request.header(name, value);
        }

        let res = request.send().await.map_err(|e| self.network_error(e))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::from_status(
                &self.provider_def.id,
                status.as_u16(),
                body,
            ));
        }
        Ok(res)
    }

    async fn generate_openai(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let req = OpenAiRequest {
            model: model_id,
            max_tokens,
            messages: messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: &m.role,
                    content: &m.content,
                })
                .collect(),
        };

        let parsed: OpenAiResponse = self
            .send(&req)
            .await?
            .json()
            .await
            .map_err(|e| self.parse_error(e))?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn generate_anthropic(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        // Anthropic takes the system prompt out of band.
        let system = messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let req = AnthropicRequest {
            model: model_id,
            max_tokens,
            system: (!system.is_empty()).then_some(system),
            messages: messages
                .iter()
                .filter(|m| m.role != "system")
                .map(|m| OpenAiMessage {
                    role: &m.role,
                    content: &m.content,
                })
                .collect(),
        };

        let parsed: AnthropicResponse = self
            .send(&req)
            .await?
            .json()
            .await
            .map_err(|e| self.parse_error(e))?;
        Ok(parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .unwrap_or_default())
    }
}

#[async_trait]
impl LlmProvider for GenericProvider {
    fn provider_id(&self) -> &str {
        &self.provider_def.id
    }

    async fn generate(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        match self.provider_def.api_format {
            ApiFormat::Openai => self.generate_openai(model_id, messages, max_tokens).await,
            ApiFormat::Anthropic => {
                self.generate_anthropic(model_id, messages, max_tokens)
                    .await
            }
        }
    }
}
