use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use warden_core::{ActionType, SessionMode, WardenError};

/// Per-mode handling lists. A type should appear in at most one list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModeRules {
    pub auto_accept: Vec<ActionType>,
    pub require_approval: Vec<ActionType>,
    pub quick_confirm: Vec<ActionType>,
}

impl ModeRules {
    /// Whether `action_type` appears in any list.
    pub fn mentions(&self, action_type: ActionType) -> bool {
        self.auto_accept.contains(&action_type)
            || self.require_approval.contains(&action_type)
            || self.quick_confirm.contains(&action_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StopOn {
    /// End the session once this many task errors have accumulated.
    pub error_count: u32,
    /// Stop an autonomous session on an action no rule list mentions.
    pub unknown_action: bool,
}

impl Default for StopOn {
    fn default() -> Self {
        Self {
            error_count: 3,
            unknown_action: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timing {
    pub quick_confirm_ms: u64,
    pub approval_timeout_sec: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            quick_confirm_ms: 3000,
            approval_timeout_sec: 300,
        }
    }
}

/// User-supplied policy: which action types are accepted, confirmed or
/// gated in each mode, plus session stop conditions and timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuleConfig {
    pub autonomous: ModeRules,
    pub assisted: ModeRules,
    pub stop_on: StopOn,
    pub timing: Timing,
}

impl Default for RuleConfig {
    fn default() -> Self {
        use ActionType::*;
        Self {
            autonomous: ModeRules {
                auto_accept: vec![FileCreate, FileEdit, CommandRun, GitCommit, NpmInstall],
                require_approval: vec![FileDelete, GitPush, PackageInstall],
                quick_confirm: vec![],
            },
            assisted: ModeRules {
                auto_accept: vec![FileCreate, FileEdit],
                require_approval: vec![FileDelete, GitPush],
                quick_confirm: vec![
                    CommandRun,
                    GitCommit,
                    NpmInstall,
                    PackageInstall,
                    NetworkRequest,
                ],
            },
            stop_on: StopOn::default(),
            timing: Timing::default(),
        }
    }
}

impl RuleConfig {
    pub fn for_mode(&self, mode: SessionMode) -> &ModeRules {
        match mode {
            SessionMode::Autonomous => &self.autonomous,
            SessionMode::Assisted => &self.assisted,
        }
    }

    /// Load rules from a YAML file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(WardenError::from)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing rules in {}", path.display()))
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yml::from_str(yaml)
            .map_err(|e| WardenError::Config(e.to_string()))
            .context("invalid rule configuration")
    }
}
