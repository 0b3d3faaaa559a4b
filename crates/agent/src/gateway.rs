//! Model gateway: history in, one completion out.

use std::sync::Arc;
use async_trait::async_trait;
use blockmind_config::AppConfig;
use blockmind_core::error::ProviderError;
use blockmind_core::event::{DomainEvent, EventBus};
use blockmind_core::provider::{Provider, ProviderRequest, RequestMessage};
use blockmind_core::turn::Turn;
use chrono::Utc;
use tracing::{debug, warn};
use crate::history::Memorizer;
use crate::prompter::Prompter;

/// Sends conversation history to a language model.
pub struct ModelGateway {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    agent_name: String,
    retries: u32,
    events: Option<Arc<EventBus>>,
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            agent_name: agent_name.into(),
            retries: 1,
            events: None,
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, config: &AppConfig) -> Self {
        Self::new(provider, &config.default_model, &config.profile.name)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_retries(config.agent.gateway_retries)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Extra attempts after a failed request.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Map turns onto request roles: the agent's own turns are the
    /// assistant, system turns stay system, everyone else is a user whose
    /// name prefixes the message.
    pub fn to_messages(&self, turns: &[Turn]) -> Vec<RequestMessage> {
        let mut messages: Vec<RequestMessage> = turns
            .iter()
            .map(|turn| {
                if turn.speaker == self.agent_name {
                    RequestMessage::assistant(&turn.content)
                } else if turn.is_system() {
                    RequestMessage::system(&turn.content)
                } else {
                    RequestMessage::user(format!("{}: {}", turn.speaker, turn.content))
                }
            })
            .collect();

        // some backends reject a request without any conversation
        if messages.is_empty() {
            messages.push(RequestMessage::user("Begin."));
        }
        messages
    }

    /// Request one completion for `turns` under `system`.
    pub async fn send_request(&self, turns: &[Turn], system: &str) -> Result<String, ProviderError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            system: system.to_string(),
            messages: self.to_messages(turns),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stop: vec![],
        };

        let mut attempt = 0;
        loop {
            debug!(
                provider = self.provider.name(),
                model = %self.model,
                messages = request.messages.len(),
                attempt,
                "Sending model request"
            );

            match self.provider.complete(request.clone()).await {
                Ok(response) => {
                    if let Some(events) = &self.events {
                        events.publish(DomainEvent::ResponseGenerated {
                            model: response.model.clone(),
                            tokens_used: response.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0),
                            timestamp: Utc::now(),
                        });
                    }
                    return Ok(response.content);
                }
                Err(e) if attempt < self.retries => {
                    warn!(error = %e, attempt, "Model request failed, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    if let Some(events) = &self.events {
                        events.publish(DomainEvent::ErrorOccurred {
                            context: "model_request".into(),
                            error_message: e.to_string(),
                            timestamp: Utc::now(),
                        });
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// Summarizes old turns through the gateway with the memory-saving prompt.
pub struct GatewayMemorizer<'a> {
    pub gateway: &'a ModelGateway,
    pub prompter: &'a Prompter,
}

#[async_trait]
impl Memorizer for GatewayMemorizer<'_> {
    async fn summarize(&self, turns: &[Turn]) -> Result<String, ProviderError> {
        let prompt = self.prompter.saving_memory(turns);
        self.gateway.send_request(&[], &prompt).await
    }
}
