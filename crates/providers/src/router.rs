//! Provider router: selects the LLM provider named in config.
//!
//! Handles provider creation and routing requests to the right backend.

use crate::ollama::{DEFAULT_OLLAMA_URL, OllamaProvider};
use crate::openai_compat::OpenAiCompatProvider;
use cryslgen_config::AppConfig;
use cryslgen_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;

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

    pub fn default_name(&self) -> &str {
        &self.default_provider
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Resolve a provider name, or an ad-hoc `custom:<base-url>` endpoint.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Provider>> {
        if let Some(base_url) = name.strip_prefix("custom:") {
            return Some(Arc::new(OpenAiCompatProvider::new("custom", base_url, "")));
        }
        self.get(name)
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build providers from configuration.
///
/// Every `[providers.<name>]` table is registered; the selected
/// `provider` is always present even without a table of its own.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();
        let provider = make_provider(name, provider_config.api_url.as_deref(), &api_key);
        router.register(name.clone(), provider);
    }

    if router.get(&config.provider).is_none() {
        let api_key = config.api_key.clone().unwrap_or_default();
        let provider = make_provider(&config.provider, None, &api_key);
        router.register(config.provider.clone(), provider);
    }

    tracing::debug!(providers = ?router.list(), default = %config.provider, "Provider router built");
    router
}

fn make_provider(name: &str, api_url: Option<&str>, api_key: &str) -> Arc<dyn Provider> {
    if name == "ollama" {
        return Arc::new(OllamaProvider::new(api_url.unwrap_or(DEFAULT_OLLAMA_URL)));
    }
    if let Some(base_url) = name.strip_prefix("custom:") {
        return Arc::new(OpenAiCompatProvider::new("custom", base_url, api_key));
    }
    let base_url = api_url.map(String::from).unwrap_or_else(|| default_base_url(name));
    Arc::new(OpenAiCompatProvider::new(name, base_url, api_key))
}

/// Get the default base URL for well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
