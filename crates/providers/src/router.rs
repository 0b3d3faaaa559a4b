//! Provider router: selects the LLM backend from configuration.
//!
//! When no provider is named, the backend is inferred from the model string.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use blockmind_config::AppConfig;
use blockmind_core::error::ProviderError;
use blockmind_core::provider::Provider;
use crate::anthropic::AnthropicProvider;
use crate::fallback::FallbackProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn default_name(&self) -> &str {
        &self.default_provider
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

/// Infer which API serves a model from its name.
pub fn infer_provider(model: &str) -> Result<&'static str, ProviderError> {
    let model = model.to_ascii_lowercase();
    if model.starts_with("gemini") {
        Ok("google")
    } else if model.starts_with("gpt") || model.starts_with("o1") || model.starts_with("o3") {
        Ok("openai")
    } else if model.starts_with("claude") {
        Ok("anthropic")
    } else if ["meta/", "mistralai/", "replicate/"].iter().any(|p| model.starts_with(p)) {
        Err(ProviderError::NotConfigured(format!(
            "replicate-hosted model '{model}' is not supported"
        )))
    } else {
        Ok("ollama")
    }
}

fn build_one(name: &str, config: &AppConfig) -> Arc<dyn Provider> {
    let provider_config = config.providers.get(name);
    let api_key = provider_config
        .and_then(|p| p.api_key.clone())
        .or_else(|| config.api_key.clone())
        .unwrap_or_default();
    let api_url = provider_config.and_then(|p| p.api_url.clone());

    if name == "anthropic" {
        let mut p = AnthropicProvider::new(&api_key);
        if let Some(url) = api_url {
            p = p.with_base_url(url);
        }
        Arc::new(p)
    } else {
        let base_url = api_url.unwrap_or_else(|| default_base_url(name));
        Arc::new(OpenAiCompatProvider::new(name, &base_url, &api_key))
    }
}

/// Build a router holding every configured provider plus the default one.
pub fn build_from_config(config: &AppConfig) -> Result<ProviderRouter, ProviderError> {
    let default_name = if config.default_provider.is_empty() {
        infer_provider(&config.default_model)?.to_string()
    } else {
        config.default_provider.clone()
    };

    let mut router = ProviderRouter::new(&default_name);

    for name in config.providers.keys() {
        router.register(name.clone(), build_one(name, config));
    }

    if router.get(&default_name).is_none() {
        router.register(default_name.clone(), build_one(&default_name, config));
    }

    for name in &config.fallback_providers {
        if router.get(name).is_none() {
            router.register(name.clone(), build_one(name, config));
        }
    }

    Ok(router)
}

/// Build the provider the agent talks to: the default one, wrapped in a
/// fallback chain when `fallback_providers` is set.
pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let router = build_from_config(config)?;
    let primary = router
        .default()
        .ok_or_else(|| ProviderError::NotConfigured(router.default_name().to_string()))?;

    if config.fallback_providers.is_empty() {
        return Ok(primary);
    }

    let timeout_for = |name: &str| {
        Duration::from_secs(config.providers.get(name).map(|p| p.timeout_secs).unwrap_or(60))
    };

    let mut chain = FallbackProvider::new("fallback").add(primary, timeout_for(router.default_name()));
    for name in &config.fallback_providers {
        let provider = router
            .get(name)
            .ok_or_else(|| ProviderError::NotConfigured(name.clone()))?;
        chain = match config.providers.get(name).and_then(|p| p.default_model.clone()) {
            Some(model) => chain.add_with_model(provider, timeout_for(name), model),
            None => chain.add(provider, timeout_for(name)),
        };
    }

    Ok(Arc::new(chain))
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "anthropic" => "https://api.anthropic.com".into(),
        "google" => "https://generativelanguage.googleapis.com/v1beta/openai".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
