use serde::Serialize;
use warden_core::{ActionType, SessionInsights, SessionStats};

/// Something worth telling a human about outside the terminal.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    ApprovalRequested {
        approval_id: String,
        task_id: String,
        action_type: ActionType,
        target: String,
        reason: String,
        score: f64,
    },
    TaskFailed {
        task_id: String,
        error: String,
    },
    SessionStopped {
        reason: String,
    },
    SessionEnded {
        session_id: String,
        outcome: String,
        stats: SessionStats,
        insights: SessionInsights,
    },
}

impl NotifyEvent {
    /// One-line human summary.
    pub fn summary(&self) -> String {
        match self {
            NotifyEvent::ApprovalRequested {
                approval_id,
                task_id,
                action_type,
                target,
                reason,
                score,
            } => format!(
                "Approval needed [{approval_id}] in \"{task_id}\": {action_type} {target} \
                 (risk {score:.2}, {reason})"
            ),
            NotifyEvent::TaskFailed { task_id, error } => {
                format!("Task \"{task_id}\" failed: {error}")
            }
            NotifyEvent::SessionStopped { reason } => format!("Session stopped: {reason}"),
            NotifyEvent::SessionEnded {
                outcome, stats, ..
            } => format!(
                "Session {outcome}: {} completed, {} failed, {} approved, {} denied",
                stats.tasks_completed,
                stats.tasks_failed,
                stats.actions_approved,
                stats.actions_denied
            ),
        }
    }
}

/// Outbound notification channel. Best effort; delivery failures are the
/// implementation's problem.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, event: &NotifyEvent);
}

/// Writes notifications to the tracing log.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, event: &NotifyEvent) {
        match event {
            NotifyEvent::ApprovalRequested { .. } | NotifyEvent::TaskFailed { .. } => {
                tracing::warn!(target: "warden::notify", "{}", event.summary())
            }
            _ => tracing::info!(target: "warden::notify", "{}", event.summary()),
        }
    }
}

/// Collects events in memory (for testing).
#[derive(Default)]
pub struct CollectNotifier {
    events: std::sync::Mutex<Vec<NotifyEvent>>,
}

impl CollectNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events().iter().map(NotifyEvent::summary).collect()
    }
}

#[async_trait::async_trait]
impl Notifier for CollectNotifier {
    async fn send(&self, event: &NotifyEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}
