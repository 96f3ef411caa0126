//! CLI command definitions.
//!
//! Each subcommand maps to one entry point of the factory: a full build
//! from an idea, a fix pass over an existing project, or a one-off
//! structural patch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tracing::debug;

use vibe_core::{BuildOutcome, BuildReport, FactoryConfig, CONFIG_FILE};
use vibe_llm::{LlmAdapter, StreamSink};

pub mod build;
pub mod fix;
pub mod patch;

/// vibeFactory - turn app ideas into running projects
#[derive(Parser)]
#[command(name = "vibe")]
#[command(version, about = "vibeFactory - turn app ideas into running projects")]
#[command(long_about = r#"
vibeFactory asks a language model for a complete project, writes it to
disk, installs its dependencies and runs it. When the run crashes the
traceback is diagnosed and the model is asked for a targeted fix, which is
merged into the crashing file before one more run.

COMMANDS:
  build  → Generate, run and fix a new project from an idea
  fix    → Run and fix an existing project
  patch  → Merge the blocks of one file into another

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Generation failure
  4 - Build still failing or fix aborted
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a project from an idea, then run and fix it
    Build(build::BuildArgs),

    /// Run an existing project and fix it if it crashes
    Fix(fix::FixArgs),

    /// Structurally patch a file with the contents of another
    Patch(patch::PatchArgs),
}

/// Options shared by commands that talk to the model and run projects.
#[derive(Args, Debug, Clone, Default)]
pub struct FactoryArgs {
    /// Configuration file (defaults to ./vibe.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// LLM provider: ollama, openai or anthropic
    #[arg(long)]
    pub provider: Option<String>,

    /// Model name
    #[arg(long)]
    pub model: Option<String>,

    /// Run this shell command instead of picking an entry file
    #[arg(long)]
    pub run_command: Option<String>,

    /// Let the model answer with a corrected run command
    #[arg(long)]
    pub command_fix: bool,

    /// Print the build report as JSON
    #[arg(long)]
    pub json: bool,
}

impl FactoryArgs {
    /// Load configuration, then apply environment and flag overrides.
    pub fn load_config(&self) -> Result<FactoryConfig> {
        let mut config = match &self.config {
            Some(path) => FactoryConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => FactoryConfig::load_or_default(Path::new(CONFIG_FILE))
                .context("Failed to load vibe.toml")?,
        }
        .with_env_overrides()?;

        if let Some(provider) = &self.provider {
            config.llm.provider = provider
                .parse()
                .with_context(|| format!("Invalid --provider argument: {}", provider))?;
        }
        if let Some(model) = &self.model {
            config.llm.model = Some(model.clone());
        }
        if let Some(command) = &self.run_command {
            config.fix.run_command = Some(command.clone());
        }
        if self.command_fix {
            config.fix.command_fix = true;
        }

        debug!("Effective configuration: {:?}", config);
        Ok(config)
    }
}

/// A build that finished without a working project.
#[derive(Debug, Error)]
#[error("Build {outcome}: {message}")]
pub struct BuildFailed {
    pub outcome: BuildOutcome,
    pub message: String,
}

/// Create the model client, echoing streamed text when `stream` is set.
pub fn llm_client(config: &FactoryConfig, stream: bool) -> Result<Arc<LlmAdapter>> {
    let mut adapter =
        LlmAdapter::from_config(&config.llm).context("LLM backend is not configured")?;
    if stream {
        let sink: StreamSink = Arc::new(|chunk: &str| {
            use std::io::Write;
            print!("{}", chunk);
            let _ = std::io::stdout().flush();
        });
        adapter = adapter.with_stream_sink(sink);
    }
    Ok(Arc::new(adapter))
}

/// Print a build report and turn failures into errors.
pub fn finish_report(report: BuildReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.success {
        Ok(())
    } else {
        Err(BuildFailed {
            outcome: report.outcome,
            message: report.message.lines().last().unwrap_or_default().to_string(),
        }
        .into())
    }
}

fn print_report(report: &BuildReport) {
    let path = report
        .transitions
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" → ");

    println!();
    println!("📁 Project: {}", report.project.display());
    println!("🔁 States:  {}", path);

    if let Some(install) = &report.install {
        let mark = if install.succeeded { "✅" } else { "⚠️ " };
        println!("📦 Install: {} {}", mark, install.output.lines().next().unwrap_or_default());
    }
    if let Some(attempt) = &report.attempt {
        println!(
            "🛠️  Fix:     {} ({} extra file round(s))",
            attempt.culprit_file, attempt.request_rounds
        );
        for name in &attempt.requested_files {
            println!("      - requested {}", name);
        }
    }

    println!();
    if report.success {
        println!("✅ {}", report.message);
    } else {
        println!("❌ {}:", report.outcome);
        println!("{}", report.message);
    }
}
