//! LLM backend configuration.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// LLM provider type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Ollama,
    OpenAI,
    Anthropic,
}

impl LlmProvider {
    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Ollama => "codellama:latest",
            Self::OpenAI => "gpt-5-mini",
            Self::Anthropic => "claude-sonnet-4.5",
        }
    }

    /// API root used when none is configured.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::OpenAI => "https://api.openai.com",
            Self::Anthropic => "https://api.anthropic.com",
        }
    }

    /// Environment variable holding the API key, if the provider needs one.
    pub fn api_key_var(&self) -> Option<&'static str> {
        match self {
            Self::Ollama => None,
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAI => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl FromStr for LlmProvider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "chatgpt" => Ok(Self::OpenAI),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(LlmError::UnknownProvider(other.to_string())),
        }
    }
}

/// Backend selection and connection settings.
///
/// API keys are never read from config files, only from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which backend to talk to
    pub provider: LlmProvider,
    /// Model name (provider default when unset)
    pub model: Option<String>,
    /// API root (provider default when unset)
    pub base_url: Option<String>,
    /// Maximum tokens requested from hosted providers
    pub max_tokens: Option<u32>,
}

impl LlmConfig {
    pub fn new(provider: LlmProvider) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Apply `VIBE_LLM_PROVIDER`, `VIBE_LLM_MODEL` and `OLLAMA_BASE_URL`.
    pub fn with_env_overrides(mut self) -> Result<Self, LlmError> {
        if let Ok(provider) = std::env::var("VIBE_LLM_PROVIDER") {
            if !provider.is_empty() {
                self.provider = provider.parse()?;
            }
        }
        if let Ok(model) = std::env::var("VIBE_LLM_MODEL") {
            if !model.is_empty() {
                self.model = Some(model);
            }
        }
        if self.provider == LlmProvider::Ollama {
            if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
                if !url.is_empty() {
                    self.base_url = Some(url);
                }
            }
        }
        Ok(self)
    }

    /// Effective model name.
    pub fn resolved_model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    /// Effective API root without a trailing slash.
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }
}
