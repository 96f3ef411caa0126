//! The generate, run, diagnose, patch and retry loop.
//!
//! One [`Orchestrator`] drives one project directory at a time. Every
//! step is awaited before the next begins, and every failure of the model,
//! a child process or the filesystem ends up in the returned
//! [`BuildReport`] rather than escaping as an error.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vibe_llm::TextGenerator;
use vibe_patch::{BlockSyntax, PatchOutcome, StructuralPatcher};
use vibe_runner::{
    DependencyInstaller, ExecutionHarness, ExecutionResult, InputSynthesizer, InstallReport,
    ProcessRunner, RunMode,
};

use crate::config::{FactoryConfig, FixConfig};
use crate::diagnose::{
    diagnose, find_project_file, load_project_file, requested_command, requested_files,
};
use crate::error::CoreResult;
use crate::project::{materialize, ProjectSpec};
use crate::prompts;

/// States of the fix loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixState {
    Generated,
    Running,
    Succeeded,
    Diagnosing,
    Requesting,
    Patching,
    Retrying,
    Aborted,
    StillFailing,
    GenerationFailed,
}

impl FixState {
    /// Check if the loop stops in this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Aborted | Self::StillFailing | Self::GenerationFailed
        )
    }
}

impl std::fmt::Display for FixState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Generated => "generated",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Diagnosing => "diagnosing",
            Self::Requesting => "requesting",
            Self::Patching => "patching",
            Self::Retrying => "retrying",
            Self::Aborted => "aborted",
            Self::StillFailing => "still_failing",
            Self::GenerationFailed => "generation_failed",
        };
        write!(f, "{}", name)
    }
}

/// How a fix attempt was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FixResolution {
    /// The culprit file was patched
    Patched { file: PathBuf, outcome: PatchOutcome },
    /// The run command was replaced
    Command { command: String },
}

/// One pass through diagnosis, file requests and resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixAttempt {
    pub attempt_number: u32,
    /// File the crash was attributed to
    pub culprit_file: String,
    /// Files the model asked to see
    pub requested_files: BTreeSet<String>,
    /// Extra request rounds spent on file requests
    pub request_rounds: usize,
    pub resolution: Option<FixResolution>,
}

/// Final state of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildOutcome {
    Succeeded,
    Aborted,
    StillFailing,
    GenerationFailed,
}

impl BuildOutcome {
    fn state(self) -> FixState {
        match self {
            Self::Succeeded => FixState::Succeeded,
            Self::Aborted => FixState::Aborted,
            Self::StillFailing => FixState::StillFailing,
            Self::GenerationFailed => FixState::GenerationFailed,
        }
    }
}

impl std::fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.state())
    }
}

/// Everything that happened during one build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub id: Uuid,
    pub project: PathBuf,
    pub outcome: BuildOutcome,
    pub success: bool,
    /// Human-readable summary; the failure output for `StillFailing`
    pub message: String,
    /// States visited, in order
    pub transitions: Vec<FixState>,
    /// Files written by the materializer
    pub files: Vec<PathBuf>,
    pub attempt: Option<FixAttempt>,
    /// Most recent install step
    pub install: Option<InstallReport>,
    /// Most recent execution
    pub execution: Option<ExecutionResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BuildReport {
    fn new(project: &Path) -> Self {
        Self {
            id: Uuid::new_v4(),
            project: project.to_path_buf(),
            outcome: BuildOutcome::Aborted,
            success: false,
            message: String::new(),
            transitions: Vec::new(),
            files: Vec::new(),
            attempt: None,
            install: None,
            execution: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn enter(&mut self, state: FixState) {
        debug!("[{}] -> {}", self.id, state);
        self.transitions.push(state);
    }

    fn finish(mut self, outcome: BuildOutcome, message: impl Into<String>) -> Self {
        self.enter(outcome.state());
        self.outcome = outcome;
        self.success = outcome == BuildOutcome::Succeeded;
        self.message = message.into();
        self.finished_at = Some(Utc::now());

        if self.success {
            info!("Build {} succeeded: {}", self.project.display(), self.message);
        } else {
            error!("Build {} ended {}: {}", self.project.display(), outcome, self.message);
        }
        self
    }

    /// Count of visits to `state`.
    pub fn visits(&self, state: FixState) -> usize {
        self.transitions.iter().filter(|s| **s == state).count()
    }
}

/// Drives generation and the fix loop for a project.
pub struct Orchestrator {
    llm: Arc<dyn TextGenerator>,
    patcher: StructuralPatcher,
    installer: DependencyInstaller,
    harness: ExecutionHarness,
    fix: FixConfig,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn TextGenerator>,
        runner: Arc<dyn ProcessRunner>,
        config: &FactoryConfig,
    ) -> Self {
        let installer =
            DependencyInstaller::new(runner.clone()).with_config(config.install.clone());
        let harness = ExecutionHarness::new(runner, InputSynthesizer::new(llm.clone()))
            .with_config(config.runtime.clone());

        Self {
            llm,
            patcher: StructuralPatcher::new(BlockSyntax::python()),
            installer,
            harness,
            fix: config.fix.clone(),
        }
    }

    /// Use another block syntax for patching.
    pub fn with_syntax(mut self, syntax: BlockSyntax) -> Self {
        self.patcher = StructuralPatcher::new(syntax);
        self
    }

    pub fn fix_config(&self) -> &FixConfig {
        &self.fix
    }

    /// Ask the model for a project implementing `idea`.
    pub async fn generate(&self, idea: &str, streaming: bool) -> CoreResult<ProjectSpec> {
        let prompt = prompts::generation_prompt(idea);
        info!("Requesting project from {}", self.llm.name());
        let response = self.llm.generate_text(&prompt, streaming).await?;
        debug!("Generation response: {} chars", response.len());
        ProjectSpec::parse(&response)
    }

    /// Generate a project for `idea` into `root`, then run and fix it.
    pub async fn build(&self, idea: &str, root: &Path, streaming: bool) -> BuildReport {
        let mut report = BuildReport::new(root);

        let spec = match self.generate(idea, streaming).await {
            Ok(spec) => spec,
            Err(e) => return report.finish(BuildOutcome::GenerationFailed, e.to_string()),
        };
        report.enter(FixState::Generated);

        match materialize(root, &spec) {
            Ok(files) => report.files = files,
            Err(e) => {
                return report.finish(
                    BuildOutcome::Aborted,
                    format!("Failed to materialize project: {}", e),
                )
            }
        }

        self.fix_loop(root, report).await
    }

    /// Run an existing project in `root`, fixing it once if it fails.
    pub async fn run_and_fix(&self, root: &Path) -> BuildReport {
        self.fix_loop(root, BuildReport::new(root)).await
    }

    async fn execute(
        &self,
        root: &Path,
        mode: &RunMode,
        report: &mut BuildReport,
    ) -> ExecutionResult {
        report.enter(FixState::Running);

        let install = self.installer.install(root).await;
        if !install.succeeded {
            warn!("Dependency installation failed, running anyway: {}", install.output);
        }
        report.install = Some(install);

        let result = self.harness.run(root, mode).await;
        report.execution = Some(result.clone());
        result
    }

    async fn fix_loop(&self, root: &Path, mut report: BuildReport) -> BuildReport {
        let mut mode = match &self.fix.run_command {
            Some(command) => RunMode::Command(command.clone()),
            None => RunMode::Auto,
        };

        let first = self.execute(root, &mode, &mut report).await;
        if first.succeeded {
            return report.finish(BuildOutcome::Succeeded, first.output);
        }
        info!("App failed to run, attempting auto-fix");

        report.enter(FixState::Diagnosing);
        let crash = diagnose(&first.output);
        let Some(culprit) = crash.culprit_file else {
            return report.finish(
                BuildOutcome::Aborted,
                format!(
                    "Could not determine crashed file from error. Cannot auto-fix.\n{}",
                    crash.headline
                ),
            );
        };
        let (Some(culprit_path), Some(content)) = (
            find_project_file(root, &culprit),
            load_project_file(root, &culprit),
        ) else {
            return report.finish(
                BuildOutcome::Aborted,
                format!("Could not load {}. Cannot auto-fix.", culprit),
            );
        };
        info!("Crash in {}: {}", culprit, crash.headline);

        let mut attempt = FixAttempt {
            attempt_number: 1,
            culprit_file: culprit.clone(),
            requested_files: BTreeSet::new(),
            request_rounds: 0,
            resolution: None,
        };

        report.enter(FixState::Requesting);
        let offered_command = if self.fix.command_fix {
            first.command.clone()
        } else {
            None
        };
        let mut prompt = prompts::fix_prompt(
            &crash.headline,
            &culprit,
            &content,
            offered_command.as_deref(),
        );
        let mut reply = match self.llm.generate_text(&prompt, false).await {
            Ok(reply) => reply,
            Err(e) => {
                report.attempt = Some(attempt);
                return report.finish(BuildOutcome::Aborted, format!("Fix request failed: {}", e));
            }
        };

        let mut wanted = requested_files(&reply);
        while !wanted.is_empty() && attempt.request_rounds < self.fix.max_file_requests {
            attempt.request_rounds += 1;
            report.enter(FixState::Requesting);
            info!("Model asked for {} (round {})", wanted.join(", "), attempt.request_rounds);

            for name in &wanted {
                let extra = load_project_file(root, name);
                prompt.push_str(&prompts::additional_file(name, extra.as_deref()));
                attempt.requested_files.insert(name.clone());
            }

            reply = match self.llm.generate_text(&prompt, false).await {
                Ok(reply) => reply,
                Err(e) => {
                    report.attempt = Some(attempt);
                    return report
                        .finish(BuildOutcome::Aborted, format!("Fix request failed: {}", e));
                }
            };
            wanted = requested_files(&reply);
        }
        if !wanted.is_empty() {
            warn!(
                "File request limit of {} reached, patching with the last reply",
                self.fix.max_file_requests
            );
        }

        let corrected = if self.fix.command_fix {
            requested_command(&reply)
        } else {
            None
        };
        match corrected {
            Some(command) => {
                info!("Substituting run command: {}", command);
                mode = RunMode::Command(command.clone());
                attempt.resolution = Some(FixResolution::Command { command });
            }
            None => {
                report.enter(FixState::Patching);
                info!("Applying patch to {}", culprit);
                match self.patcher.patch_file(&culprit_path, &reply) {
                    Ok(outcome) => {
                        attempt.resolution = Some(FixResolution::Patched {
                            file: culprit_path,
                            outcome,
                        });
                    }
                    Err(e) => {
                        report.attempt = Some(attempt);
                        return report.finish(
                            BuildOutcome::Aborted,
                            format!("Failed to patch {}: {}", culprit, e),
                        );
                    }
                }
            }
        }
        report.attempt = Some(attempt);

        report.enter(FixState::Retrying);
        info!("Re-running app after auto-fix");
        let second = self.execute(root, &mode, &mut report).await;
        if second.succeeded {
            report.finish(BuildOutcome::Succeeded, "App ran successfully after auto-fix.")
        } else {
            report.finish(BuildOutcome::StillFailing, second.output)
        }
    }
}
