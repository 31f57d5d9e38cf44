//! Per-session record of classified actions.
//!
//! Owned by the orchestrator and threaded into the classifier (writes) and the
//! risk scorer (reads). Both the action buffer and the per-target table are
//! bounded; the oldest entries are evicted first.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::action::{command_name, ActionEvent, ActionType};

pub const DEFAULT_MAX_EVENTS: usize = 1000;
pub const DEFAULT_MAX_TARGETS: usize = 500;

/// How often a single target has been touched this session.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TargetStats {
    pub creates: u32,
    pub edits: u32,
    pub deletes: u32,
    pub invocations: u32,
}

impl TargetStats {
    pub fn total(&self) -> u32 {
        self.creates + self.edits + self.deletes + self.invocations
    }
}

#[derive(Debug, Clone)]
pub struct HistoryStats {
    events: VecDeque<ActionEvent>,
    targets: HashMap<String, TargetStats>,
    /// Insertion order of `targets` keys, oldest first.
    target_order: VecDeque<String>,
    max_events: usize,
    max_targets: usize,
}

impl Default for HistoryStats {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStats {
    pub fn new() -> Self {
        Self::with_caps(DEFAULT_MAX_EVENTS, DEFAULT_MAX_TARGETS)
    }

    pub fn with_caps(max_events: usize, max_targets: usize) -> Self {
        Self {
            events: VecDeque::new(),
            targets: HashMap::new(),
            target_order: VecDeque::new(),
            max_events: max_events.max(1),
            max_targets: max_targets.max(1),
        }
    }

    /// Append a classified action and bump its target counters.
    pub fn record(&mut self, event: &ActionEvent) {
        self.events.push_back(event.clone());
        while self.events.len() > self.max_events {
            self.events.pop_front();
        }

        let key = target_key(event.action_type, &event.target);
        if key.is_empty() {
            return;
        }
        let stats = self.entry(key);
        match event.action_type {
            ActionType::FileCreate => stats.creates += 1,
            ActionType::FileEdit => stats.edits += 1,
            ActionType::FileDelete => stats.deletes += 1,
            _ => stats.invocations += 1,
        }
    }

    fn entry(&mut self, key: String) -> &mut TargetStats {
        if !self.targets.contains_key(&key) {
            self.target_order.push_back(key.clone());
            while self.target_order.len() > self.max_targets {
                if let Some(oldest) = self.target_order.pop_front() {
                    self.targets.remove(&oldest);
                }
            }
        }
        self.targets.entry(key).or_default()
    }

    /// Counters for a file path or command name; zeroes if never seen.
    pub fn target(&self, key: &str) -> TargetStats {
        self.targets.get(key).cloned().unwrap_or_default()
    }

    /// Counters for the key an action of `action_type` on `target` is filed under.
    pub fn for_action(&self, action_type: ActionType, target: &str) -> TargetStats {
        self.target(&target_key(action_type, target))
    }

    pub fn events(&self) -> impl Iterator<Item = &ActionEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Most-touched targets, highest first; ties by name for stable output.
    pub fn top_targets(&self, n: usize) -> Vec<(String, TargetStats)> {
        let mut all: Vec<(String, TargetStats)> = self
            .targets
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| b.1.total().cmp(&a.1.total()).then_with(|| a.0.cmp(&b.0)));
        all.truncate(n);
        all
    }
}

/// File-like actions key on the path, command-like ones on the command name.
fn target_key(action_type: ActionType, target: &str) -> String {
    match action_type {
        t if t.is_file_like() => target.trim().to_string(),
        ActionType::NpmInstall | ActionType::PackageInstall => target.trim().to_string(),
        _ => command_name(target).to_string(),
    }
}
