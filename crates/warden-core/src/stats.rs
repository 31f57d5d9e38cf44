use std::collections::BTreeMap;

use serde::Serialize;

use crate::action::ActionType;
use crate::history::HistoryStats;
use crate::risk::RiskLevel;

/// Session counters. Only ever incremented, only by the orchestrator.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SessionStats {
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub actions_approved: u32,
    pub actions_denied: u32,
    pub errors: u32,
    pub files_changed: u32,
    pub started_at: String,
}

impl SessionStats {
    pub fn new(started_at: impl Into<String>) -> Self {
        Self {
            started_at: started_at.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TargetTouches {
    pub target: String,
    pub count: u32,
}

/// End-of-session summary of what the agent did.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SessionInsights {
    pub action_types: BTreeMap<ActionType, u32>,
    pub risk_levels: BTreeMap<RiskLevel, u32>,
    pub top_targets: Vec<TargetTouches>,
}

impl SessionInsights {
    pub fn record(&mut self, action_type: ActionType, level: RiskLevel) {
        *self.action_types.entry(action_type).or_default() += 1;
        *self.risk_levels.entry(level).or_default() += 1;
    }

    /// Fill `top_targets` from the session history.
    pub fn finish(&mut self, history: &HistoryStats, top_n: usize) {
        self.top_targets = history
            .top_targets(top_n)
            .into_iter()
            .map(|(target, stats)| TargetTouches {
                target,
                count: stats.total(),
            })
            .collect();
    }

    pub fn total_actions(&self) -> u32 {
        self.action_types.values().sum()
    }
}
