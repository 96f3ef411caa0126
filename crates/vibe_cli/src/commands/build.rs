//! Build command - Generate a project from an idea and make it run.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tracing::info;

use vibe_core::Orchestrator;
use vibe_runner::LocalRunner;

use super::{finish_report, llm_client, FactoryArgs};

#[derive(Args)]
pub struct BuildArgs {
    /// Description of the app to build
    pub idea: String,

    /// Project folder name
    #[arg(short, long)]
    pub name: String,

    /// Parent directory for the project (defaults to the current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Stream the model's response while it is generated
    #[arg(long)]
    pub stream: bool,

    #[command(flatten)]
    pub factory: FactoryArgs,
}

pub async fn execute(args: BuildArgs) -> Result<()> {
    if args.name.trim().is_empty() {
        anyhow::bail!("Invalid argument: --name must not be empty");
    }

    let config = args.factory.load_config()?;
    let parent = match args.output {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let root = parent.join(args.name.trim());

    info!("Building '{}' into {}", args.idea, root.display());
    println!("🧠 Thinking...\n");

    let llm = llm_client(&config, args.stream)?;
    let orchestrator = Orchestrator::new(llm, Arc::new(LocalRunner::new()), &config);
    let report = orchestrator.build(&args.idea, &root, args.stream).await;
    if args.stream {
        println!();
    }

    finish_report(report, args.factory.json)
}
