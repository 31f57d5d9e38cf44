use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use warden_core::{SessionMode, WardenError};
use warden_guard::RuleConfig;

use crate::agent::CommandLauncher;
use crate::queue::parser::expand_variables;
use crate::queue::ContextSection;

/// Everything a session needs besides the queue itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: SessionMode,
    pub rules: RuleConfig,
    pub agent: AgentConfig,
    /// Prepended to every task prompt, in order.
    pub context: Vec<ContextSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub bin: PathBuf,
    /// Passed before the prompt, which is always the last argument.
    pub args: Vec<String>,
    pub timeout_sec: u64,
    pub terminate_grace_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bin: PathBuf::from("claude"),
            args: vec!["-p".into()],
            timeout_sec: 1800,
            terminate_grace_ms: 5000,
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }

    pub fn launcher(&self) -> CommandLauncher {
        CommandLauncher::new(&self.bin)
            .with_args(self.args.clone())
            .with_grace(Duration::from_millis(self.terminate_grace_ms))
    }
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(WardenError::from)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("loading config {}", path.display()))
    }

    /// Parse YAML. Missing fields take their defaults; `${{ env.VAR }}` is
    /// expanded in string values.
    pub fn parse(yaml: &str) -> Result<Self> {
        let mut raw: serde_yml::Value = serde_yml::from_str(yaml)
            .map_err(|e| WardenError::Config(e.to_string()))
            .context("invalid YAML syntax")?;
        if raw.is_null() {
            return Ok(Self::default());
        }
        expand_variables(&mut raw);
        serde_yml::from_value(raw)
            .map_err(|e| WardenError::Config(e.to_string()))
            .context("config schema validation failed")
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.rules.timing.approval_timeout_sec)
    }
}
