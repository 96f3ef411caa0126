//! Fix command - Run an existing project and repair a crash.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tracing::info;

use vibe_core::Orchestrator;
use vibe_runner::LocalRunner;

use super::{finish_report, llm_client, FactoryArgs};

#[derive(Args)]
pub struct FixArgs {
    /// Project directory
    pub path: PathBuf,

    #[command(flatten)]
    pub factory: FactoryArgs,
}

pub async fn execute(args: FixArgs) -> Result<()> {
    if !args.path.is_dir() {
        anyhow::bail!("Project directory not found: {}", args.path.display());
    }

    let config = args.factory.load_config()?;
    info!("Running {}", args.path.display());
    println!("🛠️  Running app test...");

    let llm = llm_client(&config, false)?;
    let orchestrator = Orchestrator::new(llm, Arc::new(LocalRunner::new()), &config);
    let report = orchestrator.run_and_fix(&args.path).await;

    finish_report(report, args.factory.json)
}
