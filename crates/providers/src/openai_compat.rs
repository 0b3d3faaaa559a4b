//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Groq, Together AI, and any
//! endpoint exposing `/v1/chat/completions`.

use async_trait::async_trait;
use blockmind_core::error::ProviderError;
use blockmind_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::http;

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the wire messages: the system prompt first, then the conversation.
    fn to_api_messages(request: &ProviderRequest) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(ApiMessage {
                role: "system".into(),
                content: request.system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| ApiMessage {
            role: match m.role {
                RequestRole::User => "user".into(),
                RequestRole::Assistant => "assistant".into(),
                RequestRole::System => "system".into(),
            },
            content: m.content.clone(),
        }));
        messages
    }
}

#[async_trait]
impl blockmind_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let request_builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body);
        let response = http::send(request_builder).await?;
        let response = http::check_status(&self.name, &request.model, response).await?;

        let api_response: ApiResponse = response.json().await.map_err(|e| http::parse_failure(&self.name, e))?;

        Self::parse_response(api_response)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = http::send(self.client.get(&url).bearer_auth(&self.api_key)).await?;
        Ok(response.status().is_success())
    }
}

impl OpenAiCompatProvider {
    fn parse_response(api_response: ApiResponse) -> Result<ProviderResponse, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            usage,
            model: api_response.model,
        })
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockmind_core::Provider;

    #[test]
    fn openrouter_constructor() {
        let provider = OpenAiCompatProvider::openrouter("sk-test");
        assert_eq!(provider.name(), "openrouter");
        assert_eq!(provider.base_url(), "https://openrouter.ai/api/v1");
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let provider = OpenAiCompatProvider::new("vllm", "http://gpu:8000/v1/", "none");
        assert_eq!(provider.base_url(), "http://gpu:8000/v1");
    }

    #[test]
    fn system_prompt_leads_the_conversation() {
        let request = ProviderRequest {
            model: "gpt-4o".into(),
            system: "You are andy.".into(),
            messages: vec![
                RequestMessage::user("steve: hi"),
                RequestMessage::assistant("hello!"),
                RequestMessage::system("Action output: done"),
            ],
            temperature: 0.7,
            max_tokens: None,
            stop: vec![],
        };
        let api = OpenAiCompatProvider::to_api_messages(&request);
        assert_eq!(api.len(), 4);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[0].content, "You are andy.");
        assert_eq!(api[2].role, "assistant");
        assert_eq!(api[3].role, "system");
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let request = ProviderRequest {
            model: "gpt-4o".into(),
            system: String::new(),
            messages: vec![RequestMessage::user("hi")],
            temperature: 0.7,
            max_tokens: None,
            stop: vec![],
        };
        assert_eq!(OpenAiCompatProvider::to_api_messages(&request).len(), 1);
    }

    #[test]
    fn parse_text_response() {
        let json = r#"{
            "model": "gpt-4o-2024-08-06",
            "choices": [{"message": {"role": "assistant", "content": "On it! !collectBlocks(\"oak_log\", 4)"}}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 12, "total_tokens": 132}
        }"#;
        let api: ApiResponse = serde_json::from_str(json).unwrap();
        let resp = OpenAiCompatProvider::parse_response(api).unwrap();
        assert!(resp.content.contains("!collectBlocks"));
        assert_eq!(resp.usage.unwrap().total_tokens, 132);
    }

    #[test]
    fn parse_empty_choices_is_an_error() {
        let api: ApiResponse = serde_json::from_str(r#"{"model":"m","choices":[]}"#).unwrap();
        assert!(OpenAiCompatProvider::parse_response(api).is_err());
    }
}
