//! HTTP adapter for chat-completion backends.
//!
//! Supports Ollama (default, local), OpenAI and Anthropic.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{LlmError, LlmResult};
use crate::generator::{StreamSink, TextGenerator};

const MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// LLM adapter that handles API calls.
pub struct LlmAdapter {
    config: LlmConfig,
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
    stream_sink: Option<StreamSink>,
    retry_delay: Duration,
}

impl LlmAdapter {
    /// Create a new adapter with an explicit key.
    pub fn new(config: LlmConfig, api_key: Option<String>) -> Self {
        let model = config.resolved_model();
        let base_url = config.resolved_base_url();
        Self {
            config,
            api_key,
            model,
            base_url,
            client: reqwest::Client::new(),
            stream_sink: None,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Create an adapter, reading the API key from the provider's env var.
    pub fn from_config(config: &LlmConfig) -> LlmResult<Self> {
        let api_key = match config.provider.api_key_var() {
            Some(var) => {
                let key = std::env::var(var).map_err(|_| {
                    LlmError::NotConfigured(format!("{} is not set", var))
                })?;
                if key.is_empty() {
                    return Err(LlmError::NotConfigured(format!("{} is empty", var)));
                }
                Some(key)
            }
            None => None,
        };
        Ok(Self::new(config.clone(), api_key))
    }

    /// Forward streamed deltas to `sink`.
    pub fn with_stream_sink(mut self, sink: StreamSink) -> Self {
        self.stream_sink = Some(sink);
        self
    }

    /// Base delay between attempts; attempt `n` waits `delay * 2^n`.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Get the current provider.
    pub fn provider(&self) -> LlmProvider {
        self.config.provider
    }

    /// Get the current model.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> u32 {
        self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    fn api_key(&self) -> LlmResult<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            LlmError::NotConfigured(format!("no API key for {}", self.config.provider))
        })
    }

    fn emit(&self, delta: &str) {
        if let Some(sink) = &self.stream_sink {
            sink(delta);
        }
    }

    async fn check_status(&self, response: reqwest::Response) -> LlmResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(LlmError::Api {
            provider: self.config.provider.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    // Ollama chat, optionally streamed as newline-delimited JSON
    async fn complete_ollama(&self, prompt: &str, streaming: bool) -> LlmResult<String> {
        let url = format!("{}/api/chat", self.base_url);
        let request = OllamaRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            stream: streaming,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        let response = self.check_status(response).await?;

        if !streaming {
            let result: OllamaChunk = response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
            return Ok(result.message.map(|m| m.content).unwrap_or_default());
        }

        // Bytes are split into lines before decoding so multi-byte characters
        // cut across network chunks survive.
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut text = String::new();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                // Deltas already reached the sink; a retry would repeat them.
                Err(e) if !text.is_empty() => {
                    self.emit("\n");
                    return Err(LlmError::StreamInterrupted(e.to_string()));
                }
                Err(e) => return Err(LlmError::Network(format!("Stream read failed: {}", e))),
            };
            buffer.extend_from_slice(&bytes);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if let Some(delta) = parse_ollama_line(&String::from_utf8_lossy(&line))? {
                    self.emit(&delta);
                    text.push_str(&delta);
                }
            }
        }
        if let Some(delta) = parse_ollama_line(&String::from_utf8_lossy(&buffer))? {
            self.emit(&delta);
            text.push_str(&delta);
        }
        self.emit("\n");

        Ok(text)
    }

    // OpenAI chat completion
    async fn complete_openai(&self, prompt: &str) -> LlmResult<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            max_completion_tokens: Some(self.max_tokens()),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key()?))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        let response = self.check_status(response).await?;

        let result: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::EmptyResponse("OpenAI".to_string()))
    }

    // Anthropic messages API
    async fn complete_anthropic(&self, prompt: &str) -> LlmResult<String> {
        let url = format!("{}/v1/messages", self.base_url);
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens(),
            messages: vec![ChatMessage::user(prompt)],
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key()?)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        let response = self.check_status(response).await?;

        let result: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        result
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| LlmError::EmptyResponse("Anthropic".to_string()))
    }
}

#[async_trait]
impl TextGenerator for LlmAdapter {
    async fn generate_text(&self, prompt: &str, streaming: bool) -> LlmResult<String> {
        debug!(
            provider = %self.config.provider,
            model = %self.model,
            prompt_chars = prompt.len(),
            streaming,
            "Sending prompt"
        );

        let mut last_error = None;
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 2x, 4x the base delay
                tokio::time::sleep(self.retry_delay * (1 << attempt)).await;
            }

            let result = match self.config.provider {
                LlmProvider::Ollama => self.complete_ollama(prompt, streaming).await,
                LlmProvider::OpenAI => self.complete_openai(prompt).await,
                LlmProvider::Anthropic => self.complete_anthropic(prompt).await,
            };

            match result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() => {
                    warn!(
                        "{} request failed (attempt {}/{}): {}",
                        self.config.provider,
                        attempt + 1,
                        MAX_RETRIES,
                        e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(LlmError::RetriesExhausted))
    }

    fn name(&self) -> String {
        format!("{}:{}", self.config.provider, self.model)
    }
}

/// Parse one NDJSON line of an Ollama stream into its content delta.
fn parse_ollama_line(line: &str) -> LlmResult<Option<String>> {
    let line = line.trim();
    let line = line.strip_prefix("data: ").unwrap_or(line);
    if line.is_empty() {
        return Ok(None);
    }
    let chunk: OllamaChunk =
        serde_json::from_str(line).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    Ok(chunk.message.map(|m| m.content).filter(|c| !c.is_empty()))
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

// Ollama API types
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    message: Option<OllamaMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: String,
}

// Anthropic API types
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: String,
}
