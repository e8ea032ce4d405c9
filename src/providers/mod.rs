//! LLM provider abstraction
//!
//! Providers implement the [`ChatProvider`] trait and are looked up by
//! name through the [`ProviderRegistry`]. Adding a backend means adding
//! an adapter and registering it; nothing else in the gateway changes.

pub mod anthropic;
pub mod base;
pub mod ollama;
pub mod openai;
mod stream;

pub use anthropic::AnthropicProvider;
pub use base::{
    ChatMessage, ChatProvider, GenerationParams, GenerationResult, Role, TextStream,
};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use crate::config::ProvidersConfig;
use crate::error::{GatewayError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Name-keyed registry of provider adapters
///
/// Lookup failures surface as `InvalidArgument` so callers can report the
/// unknown name alongside the known ones.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ChatProvider>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under its own name, replacing any previous
    /// registration for that name.
    pub fn register(&mut self, provider: Arc<dyn ChatProvider>) {
        tracing::debug!(provider = provider.name(), "registering provider");
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Looks up a provider by name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` naming the unknown provider and the
    /// registered alternatives.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ChatProvider>> {
        self.providers.get(name).cloned().ok_or_else(|| {
            let mut known = self.names();
            known.sort();
            GatewayError::invalid(format!(
                "unknown provider '{}' (available: {})",
                name,
                known.join(", ")
            ))
        })
    }

    /// Names of all registered providers, in arbitrary order.
    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Builds a registry with all three built-in providers from
    /// configuration.
    ///
    /// Every adapter is registered regardless of whether its credential is
    /// set; a missing key fails the individual request, not startup.
    ///
    /// # Errors
    ///
    /// Returns an error if any adapter's HTTP client cannot be built.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(OpenAiProvider::new(config.openai.clone())?));
        registry.register(Arc::new(AnthropicProvider::new(config.anthropic.clone())?));
        registry.register(Arc::new(OllamaProvider::new(config.ollama.clone())?));
        Ok(registry)
    }
}
