//! Factory configuration loaded from `vibe.toml`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use vibe_llm::LlmConfig;
use vibe_runner::{HarnessConfig, InstallerConfig};

use crate::error::{CoreError, CoreResult};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "vibe.toml";

/// Fix-loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixConfig {
    /// Extra rounds the model may spend asking for other files
    pub max_file_requests: usize,
    /// Let the model answer with a corrected run command
    pub command_fix: bool,
    /// Shell command used instead of automatic entry selection
    pub run_command: Option<String>,
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            max_file_requests: 3,
            command_fix: false,
            run_command: None,
        }
    }
}

/// Complete configuration of a factory run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    pub llm: LlmConfig,
    pub runtime: HarnessConfig,
    pub install: InstallerConfig,
    pub fix: FixConfig,
}

impl FactoryConfig {
    /// Parse configuration from TOML text; missing keys take defaults.
    pub fn from_toml(text: &str) -> CoreResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read configuration from `path`.
    pub fn load(path: &Path) -> CoreResult<Self> {
        debug!("Reading configuration from {:?}", path);
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Read `path` when it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> CoreResult<Self> {
        if path.is_file() {
            Self::load(path)
        } else {
            debug!("No configuration at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Apply environment overrides for the LLM backend.
    pub fn with_env_overrides(mut self) -> CoreResult<Self> {
        self.llm = self
            .llm
            .with_env_overrides()
            .map_err(|e| CoreError::Config(e.to_string()))?;
        Ok(self)
    }
}
