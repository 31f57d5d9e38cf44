//! Structured event logging for sessions.
//!
//! Writes append-only JSONL to `.warden/sessions/{session_id}/events.jsonl`.

use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use warden_core::{
    now_rfc3339, ActionType, RiskLevel, SessionInsights, SessionMode, SessionStats,
};

// ── Event types ──

/// A session event. Serialized as tagged JSON (`"type": "session_start"`, etc.).
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SessionStart {
        session_id: String,
        queue: String,
        task_count: usize,
        mode: SessionMode,
    },
    TaskStart {
        task_id: String,
        index: usize,
    },
    ActionDetected {
        task_id: String,
        action_type: ActionType,
        target: String,
        score: f64,
        level: RiskLevel,
        outcome: String,
        reason: String,
    },
    ApprovalRequested {
        task_id: String,
        approval_id: String,
        action_type: ActionType,
        target: String,
    },
    ApprovalResolved {
        approval_id: String,
        resolution: String,
    },
    TaskCompleted {
        task_id: String,
        duration_ms: u64,
    },
    TaskFailed {
        task_id: String,
        duration_ms: u64,
        error: String,
    },
    SessionPaused,
    SessionResumed,
    SessionEnd {
        outcome: String,
        tasks_pending: usize,
        stats: SessionStats,
        insights: SessionInsights,
    },
}

/// Wrapper that adds sequence number and timestamp to each event.
#[derive(Debug, Serialize)]
pub struct FullEvent {
    pub seq: u32,
    pub ts: String,
    #[serde(flatten)]
    pub event: Event,
}

// ── EventLogger ──

/// Append-only JSONL event writer.
pub struct EventLogger {
    jsonl_path: PathBuf,
    seq: u32,
    stdout_json: bool,
}

impl EventLogger {
    /// Path: `{cwd}/.warden/sessions/{session_id}/events.jsonl`.
    pub fn new(cwd: &Path, session_id: &str) -> Self {
        Self {
            jsonl_path: events_path(cwd, session_id),
            seq: 0,
            stdout_json: false,
        }
    }

    /// Also print every event as one JSON line on stdout.
    pub fn with_stdout_json(mut self, enabled: bool) -> Self {
        self.stdout_json = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.jsonl_path
    }

    /// Record an event. Best-effort: silently ignores write failures.
    pub fn record(&mut self, event: Event) {
        let full = FullEvent {
            seq: self.seq,
            ts: now_rfc3339(),
            event,
        };
        self.seq += 1;

        if let Ok(line) = serde_json::to_string(&full) {
            if self.stdout_json {
                println!("{line}");
            }
            let _ = append_line(&self.jsonl_path, &line);
        }
    }
}

pub fn events_path(cwd: &Path, session_id: &str) -> PathBuf {
    cwd.join(".warden")
        .join("sessions")
        .join(session_id)
        .join("events.jsonl")
}

/// Append a single line to a file, creating parent dirs if needed.
fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}
