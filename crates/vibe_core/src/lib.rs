//! # vibe_core
//!
//! Core of vibeFactory: turning an idea into a running project.
//!
//! The [`Orchestrator`] asks the model for a JSON file map, writes it to
//! disk, installs dependencies and runs the result. When the run crashes
//! the traceback is diagnosed, the model is asked for a fix (and may ask to
//! see other files first), the fix is merged into the culprit file and the
//! project is run once more.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use vibe_core::{FactoryConfig, Orchestrator};
//! use vibe_llm::LlmAdapter;
//! use vibe_runner::LocalRunner;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FactoryConfig::default();
//!     let llm = Arc::new(LlmAdapter::from_config(&config.llm)?);
//!     let orchestrator = Orchestrator::new(llm, Arc::new(LocalRunner::new()), &config);
//!
//!     let report = orchestrator
//!         .build("a number guessing game", Path::new("./guess"), false)
//!         .await;
//!     println!("{}: {}", report.outcome, report.message);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod diagnose;
pub mod error;
pub mod orchestrator;
pub mod project;
pub mod prompts;

pub use config::{FactoryConfig, FixConfig, CONFIG_FILE};
pub use diagnose::{
    diagnose, find_project_file, load_project_file, requested_command, requested_files,
    DiagnosedCrash, UNKNOWN_ERROR,
};
pub use error::{CoreError, CoreResult};
pub use orchestrator::{
    BuildOutcome, BuildReport, FixAttempt, FixResolution, FixState, Orchestrator,
};
pub use project::{materialize, ProjectSpec};
