//! Fallback chain: the agent keeps talking when its primary backend is down.
//!
//! Backends are tried in order, each under its own deadline. An entry may
//! pin a model name because model identifiers differ between backends. The
//! error of the last backend tried is the one reported.

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use blockmind_core::error::ProviderError;
use blockmind_core::provider::*;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct FallbackProvider {
    name: String,
    chain: Vec<Backend>,
}

struct Backend {
    provider: Arc<dyn Provider>,
    deadline: Duration,
    /// Replaces the requested model for this backend
    model: Option<String>,
}

impl Backend {
    async fn attempt(&self, mut request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if let Some(model) = &self.model {
            request.model = model.clone();
        }
        debug!(provider = self.provider.name(), model = %request.model, "Trying backend");

        tokio::time::timeout(self.deadline, self.provider.complete(request))
            .await
            .unwrap_or_else(|_| {
                Err(ProviderError::Timeout(format!(
                    "Provider '{}' timed out after {}s",
                    self.provider.name(),
                    self.deadline.as_secs()
                )))
            })
    }
}

impl FallbackProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: Vec::new(),
        }
    }

    /// Append a backend answering within `deadline`.
    pub fn add(mut self, provider: Arc<dyn Provider>, deadline: Duration) -> Self {
        self.chain.push(Backend {
            provider,
            deadline,
            model: None,
        });
        self
    }

    /// Append a backend that is always asked for `model`.
    pub fn add_with_model(mut self, provider: Arc<dyn Provider>, deadline: Duration, model: impl Into<String>) -> Self {
        self.chain.push(Backend {
            provider,
            deadline,
            model: Some(model.into()),
        });
        self
    }

    pub fn add_default(self, provider: Arc<dyn Provider>) -> Self {
        self.add(provider, DEFAULT_TIMEOUT)
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

#[async_trait]
impl Provider for FallbackProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut failure = None;

        for (position, backend) in self.chain.iter().enumerate() {
            match backend.attempt(request.clone()).await {
                Ok(response) => {
                    if position > 0 {
                        debug!(provider = backend.provider.name(), position, "Answered by fallback backend");
                    }
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        provider = backend.provider.name(),
                        error = %e,
                        remaining = self.chain.len() - position - 1,
                        "Backend failed"
                    );
                    failure = Some(e);
                }
            }
        }

        Err(failure.unwrap_or_else(|| ProviderError::NotConfigured("No providers in fallback chain".into())))
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        for backend in &self.chain {
            if matches!(backend.provider.health_check().await, Ok(true)) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
