//! Dependency installation from a project manifest.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{CommandSpec, RunConfig};
use crate::error::RunnerError;
use crate::runner::ProcessRunner;

/// How a project's dependencies are installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Manifest file name, relative to the project root
    pub manifest: String,
    /// Package manager executable
    pub program: String,
    /// Arguments placed before the package list
    pub args: Vec<String>,
    /// Names that ship with the interpreter and are never installed
    pub builtins: Vec<String>,
    /// Install timeout in seconds
    pub timeout_secs: u64,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            manifest: "requirements.txt".to_string(),
            program: "python3".to_string(),
            args: vec!["-m".to_string(), "pip".to_string(), "install".to_string()],
            builtins: [
                "math",
                "sys",
                "os",
                "json",
                "re",
                "datetime",
                "time",
                "random",
                "typing",
                "subprocess",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            timeout_secs: 120,
        }
    }
}

/// Package specs from manifest text that need installing.
///
/// Each non-empty trimmed line is a spec; its bare name is the part before
/// `==`. Specs whose bare name is in `builtins` are dropped.
pub fn install_candidates<S: AsRef<str>>(manifest: &str, builtins: &[S]) -> Vec<String> {
    manifest
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|spec| {
            let name = spec.split("==").next().unwrap_or(spec);
            !builtins.iter().any(|b| b.as_ref() == name)
        })
        .map(str::to_string)
        .collect()
}

/// Result of an install step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallReport {
    pub succeeded: bool,
    /// Human-readable summary or package manager output
    pub output: String,
    /// Packages handed to the package manager
    pub packages: Vec<String>,
}

impl InstallReport {
    fn ok(output: impl Into<String>, packages: Vec<String>) -> Self {
        Self {
            succeeded: true,
            output: output.into(),
            packages,
        }
    }

    fn failed(output: impl Into<String>, packages: Vec<String>) -> Self {
        Self {
            succeeded: false,
            output: output.into(),
            packages,
        }
    }
}

/// Installs manifest dependencies through a process runner.
#[derive(Clone)]
pub struct DependencyInstaller {
    runner: Arc<dyn ProcessRunner>,
    config: InstallerConfig,
}

impl DependencyInstaller {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            config: InstallerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InstallerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    /// Install the dependencies listed in `root`'s manifest.
    ///
    /// Never fails outright: problems are reported through the returned
    /// report so a build can carry on without its dependencies.
    pub async fn install(&self, root: &Path) -> InstallReport {
        let manifest_path = root.join(&self.config.manifest);
        if !manifest_path.is_file() {
            info!("No {} found, skipping dependency installation", self.config.manifest);
            return InstallReport::ok(
                format!("No {} found. Skipping dependency installation.", self.config.manifest),
                Vec::new(),
            );
        }

        let manifest = match std::fs::read_to_string(&manifest_path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Cannot read {}: {}", manifest_path.display(), e);
                return InstallReport::failed(
                    format!("Error installing dependencies: {}", e),
                    Vec::new(),
                );
            }
        };

        let packages = install_candidates(&manifest, &self.config.builtins);
        if packages.is_empty() {
            info!("No external dependencies to install");
            return InstallReport::ok("No external dependencies to install.", packages);
        }

        info!("Installing {} package(s): {}", packages.len(), packages.join(", "));
        let spec = CommandSpec::new(&self.config.program)
            .args(self.config.args.iter().cloned())
            .args(packages.iter().cloned())
            .cwd(root);
        let run_config = RunConfig::default().timeout(self.config.timeout_secs);

        match self.runner.run(&spec, &run_config).await {
            Ok(output) if output.success() => {
                info!("Dependencies installed successfully");
                InstallReport::ok(output.combined_output(), packages)
            }
            Ok(output) => {
                warn!("Dependency installation failed with exit code {}", output.exit_code);
                InstallReport::failed(output.stderr, packages)
            }
            Err(RunnerError::Timeout(secs)) => {
                warn!("Dependency installation timed out after {}s", secs);
                InstallReport::failed(
                    format!("Dependency installation timed out after {} seconds.", secs),
                    packages,
                )
            }
            Err(e) => {
                warn!("Dependency installation could not run: {}", e);
                InstallReport::failed(format!("Error installing dependencies: {}", e), packages)
            }
        }
    }
}
