//! Live session state for observers, and the inbound control path.
//!
//! Stats and the task queue are `watch` channels so a late subscriber sees
//! the latest value; everything else is a fire-and-forget `broadcast`.
//! Control commands arrive over an `mpsc` channel and are applied through
//! [`SessionControl`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use warden_core::{now_rfc3339, ActionEvent, RiskAssessment, SessionStats, Task, Verdict};
use warden_guard::{ApprovalCoordinator, PendingApproval};

const RECENT_ACTIONS: usize = 50;
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct ObserverEvent {
    pub kind: String,
    pub data: serde_json::Value,
    pub ts: String,
}

/// A classified action as shown to observers.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    pub task_id: String,
    pub action: ActionEvent,
    pub risk: RiskAssessment,
    pub outcome: String,
    pub reason: String,
}

/// Full state for a (re)connecting observer.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub stats: SessionStats,
    pub queue: Vec<Task>,
    pub pending_approvals: Vec<PendingApproval>,
    pub recent_actions: Vec<ActionRecord>,
    pub paused: bool,
}

pub struct Subscription {
    pub snapshot: Snapshot,
    pub stats: watch::Receiver<SessionStats>,
    pub queue: watch::Receiver<Vec<Task>>,
    pub events: broadcast::Receiver<ObserverEvent>,
}

pub struct ObserverHub {
    stats: watch::Sender<SessionStats>,
    queue: watch::Sender<Vec<Task>>,
    events: broadcast::Sender<ObserverEvent>,
    paused: watch::Sender<bool>,
    recent: Mutex<VecDeque<ActionRecord>>,
    approvals: Arc<ApprovalCoordinator>,
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self::new(Arc::new(ApprovalCoordinator::new()))
    }
}

impl ObserverHub {
    pub fn new(approvals: Arc<ApprovalCoordinator>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            stats: watch::Sender::new(SessionStats::default()),
            queue: watch::Sender::new(Vec::new()),
            events,
            paused: watch::Sender::new(false),
            recent: Mutex::new(VecDeque::new()),
            approvals,
        }
    }

    pub fn approvals(&self) -> &Arc<ApprovalCoordinator> {
        &self.approvals
    }

    /// Push an event to live subscribers. Nobody listening is fine.
    pub fn broadcast(&self, kind: &str, data: serde_json::Value) {
        let _ = self.events.send(ObserverEvent {
            kind: kind.to_string(),
            data,
            ts: now_rfc3339(),
        });
    }

    pub fn update_stats(&self, stats: &SessionStats) {
        self.stats.send_replace(stats.clone());
    }

    pub fn add_action(&self, record: ActionRecord) {
        let data = serde_json::to_value(&record).unwrap_or_default();
        {
            let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
            if recent.len() == RECENT_ACTIONS {
                recent.pop_front();
            }
            recent.push_back(record);
        }
        self.broadcast("action", data);
    }

    /// Replace one task in the published queue, matched by id.
    pub fn update_task(&self, task: &Task) {
        self.queue.send_modify(|queue| {
            if let Some(slot) = queue.iter_mut().find(|t| t.id == task.id) {
                *slot = task.clone();
            }
        });
    }

    pub fn update_queue(&self, tasks: &[Task]) {
        self.queue.send_replace(tasks.to_vec());
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn watch_paused(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }

    /// Returns `true` if the flag changed.
    fn set_paused(&self, paused: bool) -> bool {
        self.paused.send_if_modified(|current| {
            let changed = *current != paused;
            *current = paused;
            changed
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            stats: self.stats.borrow().clone(),
            queue: self.queue.borrow().clone(),
            pending_approvals: self.approvals.pending(),
            recent_actions: self
                .recent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .cloned()
                .collect(),
            paused: self.is_paused(),
        }
    }

    /// Live receivers plus a snapshot taken after they were created, so no
    /// update falls between the two.
    pub fn subscribe(&self) -> Subscription {
        let events = self.events.subscribe();
        let stats = self.stats.subscribe();
        let queue = self.queue.subscribe();
        Subscription {
            snapshot: self.snapshot(),
            stats,
            queue,
            events,
        }
    }
}

/// Inbound command from any control surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Approve(String),
    Deny(String),
    Pause,
    Resume,
}

impl std::str::FromStr for ControlCommand {
    type Err = String;

    /// `approve <id>`, `deny <id>`, `pause`, `resume`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let verb = parts.next().unwrap_or("").to_ascii_lowercase();
        let arg = parts.next();
        match (verb.as_str(), arg) {
            ("approve" | "a", Some(id)) => Ok(ControlCommand::Approve(id.to_string())),
            ("deny" | "d", Some(id)) => Ok(ControlCommand::Deny(id.to_string())),
            ("approve" | "a" | "deny" | "d", None) => Err(format!("`{verb}` needs an approval id")),
            ("pause", None) => Ok(ControlCommand::Pause),
            ("resume", None) => Ok(ControlCommand::Resume),
            _ => Err(format!(
                "unknown command \"{}\". Valid: approve <id>, deny <id>, pause, resume",
                s.trim()
            )),
        }
    }
}

/// Applies control commands to a running session.
#[derive(Clone)]
pub struct SessionControl {
    hub: Arc<ObserverHub>,
}

impl SessionControl {
    pub fn new(hub: Arc<ObserverHub>) -> Self {
        Self { hub }
    }

    /// Returns `true` if the command had an effect.
    pub fn apply(&self, command: ControlCommand) -> bool {
        let (applied, data) = match &command {
            ControlCommand::Approve(id) => (
                self.hub.approvals().resolve(id, Verdict::Approve),
                serde_json::json!({ "command": "approve", "id": id }),
            ),
            ControlCommand::Deny(id) => (
                self.hub.approvals().resolve(id, Verdict::Deny),
                serde_json::json!({ "command": "deny", "id": id }),
            ),
            ControlCommand::Pause => (
                self.hub.set_paused(true),
                serde_json::json!({ "command": "pause" }),
            ),
            ControlCommand::Resume => (
                self.hub.set_paused(false),
                serde_json::json!({ "command": "resume" }),
            ),
        };
        if applied {
            self.hub.broadcast("control", data);
        } else {
            tracing::debug!(?command, "control command had no effect");
        }
        applied
    }

    /// Apply commands from `rx` until every sender is dropped.
    pub fn listen(self, mut rx: mpsc::Receiver<ControlCommand>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                self.apply(command);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use warden_core::{ActionType, TaskStatus};
    use warden_guard::Resolution;

    fn action() -> ActionEvent {
        ActionEvent {
            action_type: ActionType::GitPush,
            target: "git push origin main".into(),
            raw_text: "git push origin main".into(),
            confidence: 0.95,
            timestamp: now_rfc3339(),
            danger: None,
        }
    }

    fn record(i: usize) -> ActionRecord {
        ActionRecord {
            task_id: format!("t{i}"),
            action: action(),
            risk: RiskAssessment::compose(0.5, vec![]),
            outcome: "pause".into(),
            reason: "action type requires approval".into(),
        }
    }

    #[test]
    fn parse_control_commands() {
        let parse = |s: &str| s.parse::<ControlCommand>();
        assert_eq!(
            parse("approve apr_1"),
            Ok(ControlCommand::Approve("apr_1".into()))
        );
        assert_eq!(parse("  DENY apr_2 "), Ok(ControlCommand::Deny("apr_2".into())));
        assert_eq!(parse("pause"), Ok(ControlCommand::Pause));
        assert_eq!(parse("resume"), Ok(ControlCommand::Resume));
        assert!("approve".parse::<ControlCommand>().is_err());
        assert!("launch missiles".parse::<ControlCommand>().is_err());
    }

    #[test]
    fn late_subscriber_gets_snapshot() {
        let hub = ObserverHub::default();
        let mut stats = SessionStats::new("2026-02-18T10:00:00Z");
        stats.actions_approved = 3;
        hub.update_stats(&stats);
        hub.update_queue(&[Task::new("a", "x"), Task::new("b", "y")]);
        let mut running = Task::new("a", "x");
        running.status = TaskStatus::Running;
        hub.update_task(&running);
        hub.add_action(record(0));

        let sub = hub.subscribe();
        assert_eq!(sub.snapshot.stats.actions_approved, 3);
        assert_eq!(sub.snapshot.queue[0].status, TaskStatus::Running);
        assert_eq!(sub.snapshot.queue[1].status, TaskStatus::Pending);
        assert_eq!(sub.snapshot.recent_actions.len(), 1);
        assert_eq!(sub.stats.borrow().actions_approved, 3);
    }

    #[test]
    fn recent_actions_are_bounded() {
        let hub = ObserverHub::default();
        for i in 0..(RECENT_ACTIONS + 10) {
            hub.add_action(record(i));
        }
        let recent = hub.snapshot().recent_actions;
        assert_eq!(recent.len(), RECENT_ACTIONS);
        assert_eq!(recent[0].task_id, "t10");
    }

    #[tokio::test]
    async fn broadcasts_reach_live_subscribers() {
        let hub = ObserverHub::default();
        let mut sub = hub.subscribe();
        hub.broadcast("notice", serde_json::json!({ "msg": "hi" }));
        let event = sub.events.recv().await.unwrap();
        assert_eq!(event.kind, "notice");
        assert_eq!(event.data["msg"], "hi");
    }

    #[test]
    fn broadcast_without_subscribers_is_fine() {
        ObserverHub::default().broadcast("x", serde_json::Value::Null);
    }

    #[test]
    fn pause_and_resume() {
        let hub = Arc::new(ObserverHub::default());
        let control = SessionControl::new(hub.clone());
        assert!(control.apply(ControlCommand::Pause));
        assert!(hub.is_paused());
        assert!(!control.apply(ControlCommand::Pause));
        assert!(control.apply(ControlCommand::Resume));
        assert!(!hub.is_paused());
    }

    #[tokio::test]
    async fn approve_through_control_channel() {
        let hub = Arc::new(ObserverHub::default());
        let handle = hub.approvals().register(action());
        let id = handle.id().to_string();
        assert_eq!(hub.snapshot().pending_approvals.len(), 1);

        let (tx, rx) = mpsc::channel(8);
        let listener = SessionControl::new(hub.clone()).listen(rx);
        tx.send(ControlCommand::Approve(id.clone())).await.unwrap();

        let res = hub
            .approvals()
            .await_resolution(handle, Duration::from_secs(5), &CancellationToken::new())
            .await;
        assert_eq!(res, Resolution::Resolved(Verdict::Approve));

        drop(tx);
        listener.await.unwrap();
        assert!(hub.snapshot().pending_approvals.is_empty());
    }

    #[test]
    fn duplicate_resolution_has_no_effect() {
        let hub = Arc::new(ObserverHub::default());
        let control = SessionControl::new(hub.clone());
        let handle = hub.approvals().register(action());
        let id = handle.id().to_string();
        assert!(control.apply(ControlCommand::Deny(id.clone())));
        assert!(!control.apply(ControlCommand::Approve(id)));
    }
}
