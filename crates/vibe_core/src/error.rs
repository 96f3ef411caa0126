//! Error types for the core module.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while generating or repairing a project.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Generation output is not a JSON file map: {0}")]
    GenerationParse(String),

    #[error("LLM error: {0}")]
    Llm(#[from] vibe_llm::LlmError),

    #[error("Failed to write {path}: {source}")]
    Materialize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
