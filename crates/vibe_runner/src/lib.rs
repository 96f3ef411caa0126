//! # vibe_runner
//!
//! Process execution for vibeFactory.
//!
//! This crate launches generated projects: it installs their declared
//! dependencies, picks an entry point, feeds synthesized terminal input to
//! interactive programs and classifies how the run ended.
//!
//! # Features
//!
//! - **Process Runners**: local child processes with hard timeouts, or a mock
//! - **Dependency Installer**: manifest filtering and a single package manager call
//! - **Execution Harness**: entry selection, input piping, outcome messages
//! - **Input Synthesizer**: prompt detection and model-generated answers
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use vibe_llm::{LlmAdapter, LlmConfig};
//! use vibe_runner::{ExecutionHarness, InputSynthesizer, LocalRunner, RunMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let llm = Arc::new(LlmAdapter::from_config(&LlmConfig::default())?);
//!     let runner = Arc::new(LocalRunner::new());
//!     let harness = ExecutionHarness::new(runner, InputSynthesizer::new(llm));
//!
//!     let result = harness.run(Path::new("./calculator"), &RunMode::Auto).await;
//!     println!("{}: {}", result.succeeded, result.output);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod harness;
pub mod input;
pub mod installer;
pub mod local;
pub mod mock;
pub mod runner;

pub use config::{CommandSpec, RunConfig};
pub use error::{RunnerError, RunnerResult};
pub use harness::{
    select_entry, ExecutionHarness, ExecutionResult, HarnessConfig, RunMode, NO_ENTRY_MESSAGE,
    SUCCESS_MESSAGE, TIMEOUT_MESSAGE,
};
pub use input::{detect_prompts, InputSynthesizer};
pub use installer::{install_candidates, DependencyInstaller, InstallReport, InstallerConfig};
pub use local::{LocalRunner, LogHandler, LogLine, LogStream};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use runner::{ProcessOutput, ProcessRunner};
