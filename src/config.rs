//! Configuration management for Convogate
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from YAML files and environment variables. Provider
//! credentials are taken from the environment so they never have to live
//! in a config file.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider settings (OpenAI, Anthropic, Ollama)
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Conversation storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Context windowing settings
    #[serde(default)]
    pub context: ContextConfig,
}

/// Per-provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// OpenAI configuration
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Anthropic configuration
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Ollama (local) configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Bearer credential; usually supplied via `OPENAI_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL; override to point the adapter at a mock server
    #[serde(default = "default_openai_api_base")]
    pub api_base: String,

    /// Default model when the request does not name one
    #[serde(default = "default_openai_model")]
    pub model: String,
}

fn default_openai_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_openai_api_base(),
            model: default_openai_model(),
        }
    }
}

/// Anthropic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// API credential; usually supplied via `ANTHROPIC_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL; override to point the adapter at a mock server
    #[serde(default = "default_anthropic_api_base")]
    pub api_base: String,

    /// Default model when the request does not name one
    #[serde(default = "default_anthropic_model")]
    pub model: String,

    /// Value for the `anthropic-version` request header
    #[serde(default = "default_anthropic_version")]
    pub version: String,
}

fn default_anthropic_api_base() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-sonnet-20240229".to_string()
}

fn default_anthropic_version() -> String {
    "2023-06-01".to_string()
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_anthropic_api_base(),
            model: default_anthropic_model(),
            version: default_anthropic_version(),
        }
    }
}

/// Ollama provider configuration
///
/// The local variant carries no credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama server host
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Default model when the request does not name one
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama2".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
        }
    }
}

/// Conversation storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the embedded conversation database
    #[serde(default = "default_storage_path")]
    pub path: String,

    /// Conversations idle longer than this are removed by the sweeper
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// How often the retention sweeper runs
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_storage_path() -> String {
    "data/conversations".to_string()
}

fn default_retention_days() -> u32 {
    7
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            retention_days: default_retention_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Context windowing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Default token budget for the context window
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
}

fn default_max_context_tokens() -> usize {
    4000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, fails to parse, or
    /// fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-variable overrides for secrets and hosts.
    ///
    /// Recognized variables: `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`,
    /// `OLLAMA_HOST`. Empty values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.providers.openai.api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            if !key.is_empty() {
                self.providers.anthropic.api_key = Some(key);
            }
        }
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            if !host.is_empty() {
                self.providers.ollama.host = host;
            }
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.storage.path.trim().is_empty() {
            return Err(GatewayError::Config(
                "storage.path must not be empty".to_string(),
            ));
        }
        if self.storage.retention_days == 0 {
            return Err(GatewayError::Config(
                "storage.retention_days must be at least 1".to_string(),
            ));
        }
        if self.storage.sweep_interval_secs == 0 {
            return Err(GatewayError::Config(
                "storage.sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.context.max_context_tokens == 0 {
            return Err(GatewayError::Config(
                "context.max_context_tokens must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig::default(),
            storage: StorageConfig::default(),
            context: ContextConfig::default(),
        }
    }
}
