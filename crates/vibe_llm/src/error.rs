//! Error types for LLM calls.

use thiserror::Error;

/// Result type alias for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur while talking to an LLM backend.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM not configured: {0}")]
    NotConfigured(String),

    #[error("Unknown LLM provider: {0}")]
    UnknownProvider(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Failed to parse response: {0}")]
    InvalidResponse(String),

    #[error("Stream interrupted after partial output: {0}")]
    StreamInterrupted(String),

    #[error("Empty response from {0}")]
    EmptyResponse(String),

    #[error("Max retries exceeded")]
    RetriesExhausted,
}

impl LlmError {
    /// Whether the request is worth sending again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
