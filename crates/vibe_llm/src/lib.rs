//! # vibe_llm
//!
//! Text-generation capability for vibeFactory.
//!
//! The rest of the workspace only ever sees the [`TextGenerator`] trait:
//! a prompt goes in, plain text comes out. This crate ships the concrete
//! transports behind it (Ollama, OpenAI, Anthropic) and a scripted double
//! for tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use vibe_llm::{LlmAdapter, LlmConfig, TextGenerator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = LlmAdapter::from_config(&LlmConfig::default())?;
//!     let text = adapter.generate_text("Say hello", false).await?;
//!     println!("{}", text);
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod generator;
pub mod mock;

pub use adapter::LlmAdapter;
pub use config::{LlmConfig, LlmProvider};
pub use error::{LlmError, LlmResult};
pub use generator::{StreamSink, TextGenerator};
pub use mock::{CapturedPrompt, ScriptedGenerator};
