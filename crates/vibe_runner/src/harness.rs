//! Running a materialized project and classifying the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{CommandSpec, RunConfig};
use crate::error::RunnerError;
use crate::input::InputSynthesizer;
use crate::runner::ProcessRunner;

pub const SUCCESS_MESSAGE: &str = "App ran successfully.";
pub const TIMEOUT_MESSAGE: &str = "App timed out. Possible infinite loop or wrong input.";
pub const NO_ENTRY_MESSAGE: &str = "No Python app file found.";

/// Interpreter and timeouts used by the harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Interpreter the entry file is passed to
    pub interpreter: String,
    /// Extension of runnable source files, without the dot
    pub source_extension: String,
    /// Preferred entry file name
    pub canonical_entry: String,
    /// Timeout without piped input
    pub timeout_secs: u64,
    /// Timeout when synthesized input is piped in
    pub input_timeout_secs: u64,
    /// Timeout for explicit run commands
    pub command_timeout_secs: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            source_extension: "py".to_string(),
            canonical_entry: "app.py".to_string(),
            timeout_secs: 15,
            input_timeout_secs: 20,
            command_timeout_secs: 15,
        }
    }
}

/// What to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Pick an entry file and run it with the interpreter
    Auto,
    /// Run a shell command in the project root
    Command(String),
}

/// Outcome of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub succeeded: bool,
    /// Success message, stderr, or a failure description
    pub output: String,
    pub exit_code: Option<i64>,
    pub timed_out: bool,
    /// Command line that was run, if one was started
    pub command: Option<String>,
}

impl ExecutionResult {
    fn failed(output: impl Into<String>, command: Option<String>) -> Self {
        Self {
            succeeded: false,
            output: output.into(),
            exit_code: None,
            timed_out: false,
            command,
        }
    }

    fn timed_out(command: String) -> Self {
        Self {
            succeeded: false,
            output: TIMEOUT_MESSAGE.to_string(),
            exit_code: None,
            timed_out: true,
            command: Some(command),
        }
    }
}

/// Pick the entry file among the top-level files of `root`.
///
/// Files with `extension` are taken in directory-listing order; `canonical`
/// wins when present, otherwise the first listed.
pub fn select_entry(root: &Path, extension: &str, canonical: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(root).ok()?;
    let candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(extension))
        .collect();

    candidates
        .iter()
        .find(|p| p.file_name().and_then(|n| n.to_str()) == Some(canonical))
        .or_else(|| candidates.first())
        .cloned()
}

/// Executes projects through a process runner.
#[derive(Clone)]
pub struct ExecutionHarness {
    runner: Arc<dyn ProcessRunner>,
    inputs: InputSynthesizer,
    config: HarnessConfig,
}

impl ExecutionHarness {
    pub fn new(runner: Arc<dyn ProcessRunner>, inputs: InputSynthesizer) -> Self {
        Self {
            runner,
            inputs,
            config: HarnessConfig::default(),
        }
    }

    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run the project in `root`.
    pub async fn run(&self, root: &Path, mode: &RunMode) -> ExecutionResult {
        match mode {
            RunMode::Auto => self.run_entry(root).await,
            RunMode::Command(command) => self.run_command(root, command).await,
        }
    }

    async fn run_entry(&self, root: &Path) -> ExecutionResult {
        let Some(entry) = select_entry(
            root,
            &self.config.source_extension,
            &self.config.canonical_entry,
        ) else {
            warn!("No entry file in {}", root.display());
            return ExecutionResult::failed(NO_ENTRY_MESSAGE, None);
        };
        let entry_name = entry
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let source = match std::fs::read_to_string(&entry) {
            Ok(source) => source,
            Err(e) => return ExecutionResult::failed(e.to_string(), None),
        };
        let input = self.inputs.for_source(&source).await;

        let mut spec = CommandSpec::new(&self.config.interpreter)
            .arg(&entry_name)
            .cwd(root);
        let timeout = if input.is_empty() {
            self.config.timeout_secs
        } else {
            debug!("Piping synthesized input:\n{}", input);
            spec = spec.input(input);
            self.config.input_timeout_secs
        };
        let command = spec.display();

        info!("Running {} (timeout {}s)", entry_name, timeout);
        match self.runner.run(&spec, &RunConfig::default().timeout(timeout)).await {
            Ok(output) if output.success() => ExecutionResult {
                succeeded: true,
                output: SUCCESS_MESSAGE.to_string(),
                exit_code: Some(output.exit_code),
                timed_out: false,
                command: Some(command),
            },
            Ok(output) => ExecutionResult {
                succeeded: false,
                output: output.stderr,
                exit_code: Some(output.exit_code),
                timed_out: false,
                command: Some(command),
            },
            Err(RunnerError::Timeout(_)) => ExecutionResult::timed_out(command),
            Err(e) => ExecutionResult::failed(e.to_string(), Some(command)),
        }
    }

    async fn run_command(&self, root: &Path, command: &str) -> ExecutionResult {
        let spec = CommandSpec::shell(command).cwd(root);
        let run_config = RunConfig::default().timeout(self.config.command_timeout_secs);

        info!("Running command: {}", command);
        match self.runner.run(&spec, &run_config).await {
            Ok(output) => ExecutionResult {
                succeeded: output.success(),
                output: output.combined_output(),
                exit_code: Some(output.exit_code),
                timed_out: false,
                command: Some(command.to_string()),
            },
            Err(RunnerError::Timeout(_)) => ExecutionResult::timed_out(command.to_string()),
            Err(e) => ExecutionResult::failed(e.to_string(), Some(command.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_select_entry_prefers_canonical() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("main.py"), "").unwrap();
        fs::write(temp.path().join("app.py"), "").unwrap();
        fs::write(temp.path().join("notes.txt"), "").unwrap();

        let entry = select_entry(temp.path(), "py", "app.py").unwrap();
        assert_eq!(entry.file_name().unwrap(), "app.py");
    }

    #[test]
    fn test_select_entry_falls_back_to_listed_file() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("game.py"), "").unwrap();
        fs::create_dir(temp.path().join("pkg.py")).unwrap();

        let entry = select_entry(temp.path(), "py", "app.py").unwrap();
        assert_eq!(entry.file_name().unwrap(), "game.py");
    }

    #[test]
    fn test_select_entry_ignores_nested_files() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/app.py"), "").unwrap();

        assert!(select_entry(temp.path(), "py", "app.py").is_none());
        assert!(select_entry(&temp.path().join("missing"), "py", "app.py").is_none());
    }

    #[test]
    fn test_harness_config_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.timeout_secs, 15);
        assert_eq!(config.input_timeout_secs, 20);
        assert_eq!(config.command_timeout_secs, 15);
        assert_eq!(config.canonical_entry, "app.py");
    }
}
