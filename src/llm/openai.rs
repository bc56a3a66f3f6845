use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use crate::errors::AgentError;
use super::provider::LLMProvider;
use super::types::{CompletionOptions, LLMResponse};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client for OpenAI and any server speaking the same API.
pub struct OpenAIProvider {
    client: Client,
    name: String,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIProvider {
    pub fn new(name: &str, api_key: &str, model: Option<&str>) -> Self {
        Self::with_base_url(name, api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(name: &str, api_key: &str, model: Option<&str>, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            name: name.to_string(),
            api_key: api_key.to_string(),
            model: model.unwrap_or("gpt-4o-mini").to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Map a non-2xx HTTP status to the error kind the retry policy understands.
pub(crate) fn status_error(status: StatusCode, detail: &str) -> AgentError {
    match status.as_u16() {
        429 => AgentError::RateLimit(detail.to_string()),
        401 | 403 => AgentError::Authentication(detail.to_string()),
        400 | 404 | 422 => AgentError::InvalidRequest(detail.to_string()),
        408 => AgentError::Timeout(detail.to_string()),
        _ => AgentError::LLMApi(format!("HTTP {}: {}", status.as_u16(), detail)),
    }
}

/// Turn a chat-completions reply into an `LLMResponse`.
pub(crate) fn parse_completion(
    provider: &str,
    default_model: &str,
    status: StatusCode,
    body: &str,
) -> Result<LLMResponse, AgentError> {
    if !status.is_success() {
        return Err(status_error(status, body));
    }

    let data: Value = serde_json::from_str(body)
        .map_err(|e| AgentError::LLMApi(format!("Failed to parse {} response: {}", provider, e)))?;

    if let Some(error) = data.get("error") {
        return Err(AgentError::LLMApi(error["message"].as_str().unwrap_or("Unknown").to_string()));
    }

    let content = data["choices"][0]["message"]["content"].as_str()
        .ok_or_else(|| AgentError::LLMApi(format!("No content in {} response", provider)))?
        .to_string();

    Ok(LLMResponse {
        content,
        input_tokens: data["usage"]["prompt_tokens"].as_u64(),
        output_tokens: data["usage"]["completion_tokens"].as_u64(),
        model: data["model"].as_str().unwrap_or(default_model).to_string(),
    })
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &CompletionOptions,
    ) -> Result<LLMResponse, AgentError> {
        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(json!({"role": "system", "content": sys}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        });

        let resp = self.client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout(format!("{} request timed out: {}", self.name, e))
                } else {
                    AgentError::Network(format!("{} request failed: {}", self.name, e))
                }
            })?;

        let status = resp.status();
        let body = resp.text().await
            .map_err(|e| AgentError::Network(format!("{} response body unreadable: {}", self.name, e)))?;

        parse_completion(&self.name, &self.model, status, &body)
    }

    fn provider_name(&self) -> &str { &self.name }
    fn model_name(&self) -> &str { &self.model }

    async fn health_check(&self) -> bool {
        let result = self.client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await;
        matches!(result, Ok(resp) if resp.status().is_success())
    }
}
