//! Patch command - Merge the blocks of one file into another.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use vibe_patch::{BlockSyntax, PatchOutcome, StructuralPatcher};

#[derive(Args)]
pub struct PatchArgs {
    /// File to patch
    pub file: PathBuf,

    /// File holding the new code (a raw file or a model reply with a fence)
    pub replacement: PathBuf,

    /// Print the patched text instead of writing it
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(args: PatchArgs) -> Result<()> {
    if !args.file.is_file() {
        anyhow::bail!("File not found: {}", args.file.display());
    }
    let replacement = fs::read_to_string(&args.replacement)
        .with_context(|| format!("Failed to read {}", args.replacement.display()))?;

    let patcher = StructuralPatcher::new(BlockSyntax::python());

    let outcome = if args.dry_run {
        let base = fs::read_to_string(&args.file)?;
        let (patched, outcome) = patcher.patch_source(&base, &replacement);
        print!("{}", patched);
        outcome
    } else {
        patcher
            .patch_file(&args.file, &replacement)
            .with_context(|| format!("Failed to patch {}", args.file.display()))?
    };

    match outcome {
        PatchOutcome::Merged { blocks } => {
            eprintln!("✅ Patched {}: {}", args.file.display(), blocks.join(", "))
        }
        PatchOutcome::Replaced => eprintln!("✅ Replaced {}", args.file.display()),
        PatchOutcome::Unchanged => eprintln!("ℹ️  No changes for {}", args.file.display()),
    }
    Ok(())
}
