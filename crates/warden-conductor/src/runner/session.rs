//! The session loop: one agent process per task, every output chunk run
//! through classify → score → decide, approvals awaited inline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use warden_core::{
    now_rfc3339, ActionEvent, HistoryStats, Outcome, PolicyRuling, RiskAssessment,
    SessionInsights, SessionMode, SessionStats, Task, TaskStatus, Verdict,
};
use warden_guard::{assess, decide, Classifier, Resolution};

use crate::agent::{session_id, AgentEvent, AgentLauncher};
use crate::config::SessionConfig;
use crate::observer::{ActionRecord, ObserverHub};
use crate::queue::{ContextSection, Queue};
use crate::runner::event_log::{Event, EventLogger};
use crate::runner::notify::{Notifier, NotifyEvent};

/// Targets listed in the end-of-session insights.
const TOP_TARGETS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Every task ran.
    Completed,
    /// Ended early by a stop condition. Remaining tasks stay pending.
    Stopped { reason: String },
    Cancelled,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::Stopped { .. } => "stopped",
            SessionOutcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub outcome: SessionOutcome,
    pub stats: SessionStats,
    pub insights: SessionInsights,
    /// In run order.
    pub tasks: Vec<Task>,
    pub events_path: PathBuf,
}

impl SessionReport {
    pub fn pending(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count()
    }
}

/// How a single task ended.
#[derive(Debug)]
enum TaskEnd {
    Exited(Option<i32>),
    SpawnFailed(String),
    ProcessError(String),
    TimedOut(Duration),
    Denied { approval_id: String },
    Stopped(String),
    Cancelled,
}

enum Flow {
    Continue,
    End(TaskEnd),
}

enum Wake {
    Event(Option<AgentEvent>),
    Deadline,
    Cancel,
}

/// Mutable session state. Owned by the single processing path.
struct RunState {
    stats: SessionStats,
    history: HistoryStats,
    insights: SessionInsights,
    log: EventLogger,
}

pub struct SessionRunner<'a> {
    config: &'a SessionConfig,
    launcher: &'a dyn AgentLauncher,
    notifier: &'a dyn Notifier,
    hub: Arc<ObserverHub>,
    classifier: Classifier,
    cwd: PathBuf,
    json_events: bool,
}

impl<'a> SessionRunner<'a> {
    pub fn new(
        config: &'a SessionConfig,
        launcher: &'a dyn AgentLauncher,
        notifier: &'a dyn Notifier,
        hub: Arc<ObserverHub>,
        cwd: &Path,
    ) -> Self {
        Self {
            config,
            launcher,
            notifier,
            hub,
            classifier: Classifier::new(),
            cwd: cwd.to_path_buf(),
            json_events: false,
        }
    }

    pub fn with_json_events(mut self, enabled: bool) -> Self {
        self.json_events = enabled;
        self
    }

    /// Run every task in `queue` in priority order.
    pub async fn run(&self, queue: &Queue, cancel: CancellationToken) -> Result<SessionReport> {
        if !self.cwd.is_dir() {
            bail!("working directory {} does not exist", self.cwd.display());
        }

        let started_at = now_rfc3339();
        let session_id = session_id(&queue.name, &started_at).to_string();
        let mut tasks = ordered_tasks(&queue.tasks);
        let total = tasks.len();
        let error_limit = self.config.rules.stop_on.error_count;

        let mut st = RunState {
            stats: SessionStats::new(started_at),
            history: HistoryStats::new(),
            insights: SessionInsights::default(),
            log: EventLogger::new(&self.cwd, &session_id).with_stdout_json(self.json_events),
        };

        st.log.record(Event::SessionStart {
            session_id: session_id.clone(),
            queue: queue.name.clone(),
            task_count: total,
            mode: self.config.mode,
        });
        self.hub.update_queue(&tasks);
        self.hub.update_stats(&st.stats);
        self.hub.broadcast(
            "session_start",
            serde_json::json!({
                "session_id": session_id,
                "queue": queue.name,
                "mode": self.config.mode,
            }),
        );
        println!(
            "▶ Session \"{}\" ({total} tasks, {} mode)",
            queue.name,
            self.config.mode.as_str()
        );

        let mut outcome = SessionOutcome::Completed;
        for (i, task) in tasks.iter_mut().enumerate() {
            if cancel.is_cancelled() {
                outcome = SessionOutcome::Cancelled;
                break;
            }
            if self.hub.is_paused() && !self.wait_while_paused(&mut st, &cancel).await {
                outcome = SessionOutcome::Cancelled;
                break;
            }

            task.status = TaskStatus::Running;
            task.started_at = Some(now_rfc3339());
            self.hub.update_task(task);
            st.log.record(Event::TaskStart {
                task_id: task.id.clone(),
                index: i + 1,
            });
            println!("\n▶ [{}/{total}] Task \"{}\"", i + 1, task.id);

            let started = Instant::now();
            let prompt = compose_prompt(&self.config.context, &queue.context, task);
            let end = self.execute(task, &prompt, &mut st, &cancel).await;
            let stop = self.finish_task(task, end, started.elapsed(), &mut st).await;
            self.hub.update_task(task);
            self.hub.update_stats(&st.stats);

            if let Some(stopped) = stop {
                outcome = stopped;
                break;
            }
            if error_limit > 0 && st.stats.errors >= error_limit {
                let reason = format!("error limit reached ({} errors)", st.stats.errors);
                println!("  ■ {reason}");
                self.notifier
                    .send(&NotifyEvent::SessionStopped {
                        reason: reason.clone(),
                    })
                    .await;
                outcome = SessionOutcome::Stopped { reason };
                break;
            }
        }

        st.insights.finish(&st.history, TOP_TARGETS);
        let pending = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count();
        match &outcome {
            SessionOutcome::Completed => println!(
                "\n✓ Session \"{}\" completed ({} passed, {} failed)",
                queue.name, st.stats.tasks_completed, st.stats.tasks_failed
            ),
            SessionOutcome::Stopped { reason } => {
                println!("\n■ Session stopped: {reason} ({pending} tasks not run)")
            }
            SessionOutcome::Cancelled => println!("\nCancelled. {pending} tasks not run."),
        }

        st.log.record(Event::SessionEnd {
            outcome: outcome.as_str().to_string(),
            tasks_pending: pending,
            stats: st.stats.clone(),
            insights: st.insights.clone(),
        });
        self.hub.update_queue(&tasks);
        self.hub.update_stats(&st.stats);
        self.hub.broadcast(
            "session_end",
            serde_json::json!({
                "outcome": outcome,
                "stats": st.stats,
                "insights": st.insights,
            }),
        );
        self.notifier
            .send(&NotifyEvent::SessionEnded {
                session_id: session_id.clone(),
                outcome: outcome.as_str().to_string(),
                stats: st.stats.clone(),
                insights: st.insights.clone(),
            })
            .await;

        Ok(SessionReport {
            session_id,
            outcome,
            stats: st.stats,
            insights: st.insights,
            tasks,
            events_path: st.log.path().to_path_buf(),
        })
    }

    /// Block at a task boundary until resumed. Returns `false` if cancelled.
    async fn wait_while_paused(&self, st: &mut RunState, cancel: &CancellationToken) -> bool {
        println!("⏸ Session paused. Send `resume` to continue.");
        st.log.record(Event::SessionPaused);
        self.hub
            .broadcast("session_paused", serde_json::Value::Null);

        let mut paused = self.hub.watch_paused();
        let resumed = tokio::select! {
            r = paused.wait_for(|p| !*p) => r.is_ok(),
            _ = cancel.cancelled() => false,
        };
        if resumed {
            println!("▶ Resumed");
            st.log.record(Event::SessionResumed);
            self.hub
                .broadcast("session_resumed", serde_json::Value::Null);
        }
        resumed
    }

    async fn execute(
        &self,
        task: &Task,
        prompt: &str,
        st: &mut RunState,
        cancel: &CancellationToken,
    ) -> TaskEnd {
        let mut process = match self.launcher.launch(task, prompt, &self.cwd).await {
            Ok(p) => p,
            Err(e) => return TaskEnd::SpawnFailed(format!("{e:#}")),
        };

        let limit = self.config.agent.timeout();
        let deadline = tokio::time::sleep(limit);
        tokio::pin!(deadline);

        loop {
            let wake = tokio::select! {
                event = process.next_event() => Wake::Event(event),
                _ = &mut deadline => Wake::Deadline,
                _ = cancel.cancelled() => Wake::Cancel,
            };
            match wake {
                Wake::Event(Some(AgentEvent::Output { text, .. })) => {
                    if let Flow::End(end) = self.on_output(task, &text, st, cancel).await {
                        process.shutdown().await;
                        return end;
                    }
                }
                Wake::Event(Some(AgentEvent::Exited { code })) => return TaskEnd::Exited(code),
                Wake::Event(Some(AgentEvent::Failed { error })) => {
                    return TaskEnd::ProcessError(error)
                }
                Wake::Event(None) => {
                    return TaskEnd::ProcessError("agent stream closed without an exit status".into())
                }
                Wake::Deadline => {
                    process.shutdown().await;
                    return TaskEnd::TimedOut(limit);
                }
                Wake::Cancel => {
                    process.shutdown().await;
                    return TaskEnd::Cancelled;
                }
            }
        }
    }

    async fn on_output(
        &self,
        task: &Task,
        text: &str,
        st: &mut RunState,
        cancel: &CancellationToken,
    ) -> Flow {
        let Some(action) = self.classifier.detect(text, &mut st.history) else {
            return Flow::Continue;
        };
        let risk = assess(&action, &st.history);
        let ruling = decide(&action, &risk, &self.config.rules, self.config.mode);
        st.insights.record(action.action_type, risk.level);

        let (outcome, reason) = match &ruling {
            PolicyRuling::Decide(d) => (d.outcome.as_str(), d.reason.clone()),
            PolicyRuling::Stop { reason } => ("stop", reason.clone()),
        };
        tracing::info!(
            task = %task.id,
            action = %action.action_type,
            target = %action.target,
            score = risk.score,
            outcome,
            "{reason}"
        );
        st.log.record(Event::ActionDetected {
            task_id: task.id.clone(),
            action_type: action.action_type,
            target: action.target.clone(),
            score: risk.score,
            level: risk.level,
            outcome: outcome.to_string(),
            reason: reason.clone(),
        });
        self.hub.add_action(ActionRecord {
            task_id: task.id.clone(),
            action: action.clone(),
            risk: risk.clone(),
            outcome: outcome.to_string(),
            reason,
        });

        let decision = match ruling {
            PolicyRuling::Stop { reason } => {
                println!("  ■ {reason}");
                self.notifier
                    .send(&NotifyEvent::SessionStopped {
                        reason: reason.clone(),
                    })
                    .await;
                return Flow::End(TaskEnd::Stopped(reason));
            }
            PolicyRuling::Decide(d) => d,
        };

        match decision.outcome {
            Outcome::Accept => {
                self.count_accepted(&action, st);
                Flow::Continue
            }
            Outcome::QuickConfirm { timeout_ms } => {
                println!(
                    "  ⏳ {} {} (accepting in {timeout_ms}ms)",
                    action.action_type, action.target
                );
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {}
                    _ = cancel.cancelled() => return Flow::End(TaskEnd::Cancelled),
                }
                self.count_accepted(&action, st);
                Flow::Continue
            }
            Outcome::Pause | Outcome::Deny => {
                st.stats.actions_denied += 1;
                self.hub.update_stats(&st.stats);
                println!(
                    "  ⊘ {} {}: {}",
                    action.action_type, action.target, decision.reason
                );
                match self.config.mode {
                    SessionMode::Autonomous => {
                        self.await_approval(task, action, &risk, &decision.reason, st, cancel)
                            .await
                    }
                    SessionMode::Assisted => Flow::Continue,
                }
            }
        }
    }

    /// Register, notify, and block this task's stream until a verdict.
    async fn await_approval(
        &self,
        task: &Task,
        action: ActionEvent,
        risk: &RiskAssessment,
        reason: &str,
        st: &mut RunState,
        cancel: &CancellationToken,
    ) -> Flow {
        let approvals = self.hub.approvals();
        let handle = approvals.register(action.clone());
        let approval_id = handle.id().to_string();

        st.log.record(Event::ApprovalRequested {
            task_id: task.id.clone(),
            approval_id: approval_id.clone(),
            action_type: action.action_type,
            target: action.target.clone(),
        });
        self.hub.broadcast(
            "approval_requested",
            serde_json::json!({
                "id": approval_id,
                "task_id": task.id,
                "action": action,
                "risk": risk,
                "reason": reason,
            }),
        );
        println!("  ⏸ Approval required: approve {approval_id} | deny {approval_id}");
        self.notifier
            .send(&NotifyEvent::ApprovalRequested {
                approval_id: approval_id.clone(),
                task_id: task.id.clone(),
                action_type: action.action_type,
                target: action.target.clone(),
                reason: reason.to_string(),
                score: risk.score,
            })
            .await;

        let resolution = approvals
            .await_resolution(handle, self.config.approval_timeout(), cancel)
            .await;

        st.log.record(Event::ApprovalResolved {
            approval_id: approval_id.clone(),
            resolution: resolution.as_str().to_string(),
        });
        self.hub.broadcast(
            "approval_resolved",
            serde_json::json!({ "id": approval_id, "resolution": resolution.as_str() }),
        );

        match resolution {
            Resolution::Resolved(Verdict::Approve) => {
                println!("  ✓ Approved {approval_id}");
                Flow::Continue
            }
            Resolution::Cancelled if cancel.is_cancelled() => Flow::End(TaskEnd::Cancelled),
            other => {
                println!("  ✗ {approval_id} {}", other.as_str());
                Flow::End(TaskEnd::Denied { approval_id })
            }
        }
    }

    fn count_accepted(&self, action: &ActionEvent, st: &mut RunState) {
        st.stats.actions_approved += 1;
        if action.action_type.is_file_like() {
            st.stats.files_changed += 1;
        }
        self.hub.update_stats(&st.stats);
    }

    /// Apply a task's end to its status and the session counters. Returns
    /// the session outcome if the session must stop now.
    async fn finish_task(
        &self,
        task: &mut Task,
        end: TaskEnd,
        elapsed: Duration,
        st: &mut RunState,
    ) -> Option<SessionOutcome> {
        task.finished_at = Some(now_rfc3339());
        let duration_ms = elapsed.as_millis() as u64;

        // (error message, counts toward the error limit, session outcome)
        let (error, counted, stop) = match end {
            TaskEnd::Exited(Some(0)) => {
                task.status = TaskStatus::Complete;
                st.stats.tasks_completed += 1;
                println!(
                    "  ✓ Task \"{}\" completed ({})",
                    task.id,
                    format_elapsed(elapsed)
                );
                st.log.record(Event::TaskCompleted {
                    task_id: task.id.clone(),
                    duration_ms,
                });
                return None;
            }
            TaskEnd::Exited(Some(code)) => (format!("agent exited with code {code}"), true, None),
            TaskEnd::Exited(None) => ("agent killed by signal".to_string(), true, None),
            TaskEnd::SpawnFailed(e) => (e, true, None),
            TaskEnd::ProcessError(e) => (e, true, None),
            TaskEnd::TimedOut(limit) => (format!("timed out after {}", format_elapsed(limit)), true, None),
            TaskEnd::Denied { approval_id } => {
                tracing::debug!(
                    task = %task.id,
                    approval_id = %approval_id,
                    "task ended by denied approval"
                );
                ("action denied".to_string(), false, None)
            }
            TaskEnd::Stopped(reason) => (
                format!("stopped: {reason}"),
                false,
                Some(SessionOutcome::Stopped { reason }),
            ),
            TaskEnd::Cancelled => ("cancelled".to_string(), false, Some(SessionOutcome::Cancelled)),
        };

        task.status = TaskStatus::Failed;
        task.error = Some(error.clone());
        st.stats.tasks_failed += 1;
        if counted {
            st.stats.errors += 1;
        }
        println!(
            "  ✗ Task \"{}\" failed ({}): {error}",
            task.id,
            format_elapsed(elapsed)
        );
        st.log.record(Event::TaskFailed {
            task_id: task.id.clone(),
            duration_ms,
            error: error.clone(),
        });
        if stop != Some(SessionOutcome::Cancelled) {
            self.notifier
                .send(&NotifyEvent::TaskFailed {
                    task_id: task.id.clone(),
                    error,
                })
                .await;
        }
        stop
    }
}

/// Tasks in run order: by priority, queue order within a tier.
pub fn ordered_tasks(tasks: &[Task]) -> Vec<Task> {
    let mut ordered = tasks.to_vec();
    ordered.sort_by_key(|t| t.priority);
    ordered
}

/// Session context sections, then queue sections, then the task's own
/// context, then the task body.
pub fn compose_prompt(
    session_context: &[ContextSection],
    queue_context: &[ContextSection],
    task: &Task,
) -> String {
    let mut parts: Vec<String> = session_context
        .iter()
        .chain(queue_context)
        .map(ContextSection::render)
        .filter(|s| !s.is_empty())
        .collect();
    if let Some(ctx) = task.context.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        parts.push(ctx.to_string());
    }
    parts.push(task.prompt.clone());
    parts.join("\n\n")
}

fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else {
        format!("{}m{}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MockLauncher;
    use crate::observer::{ControlCommand, SessionControl};
    use crate::queue::parse_queue;
    use crate::runner::notify::CollectNotifier;
    use tokio::sync::broadcast::error::RecvError;
    use warden_core::{ActionType, Priority};
    use warden_guard::ModeRules;

    struct Harness {
        config: SessionConfig,
        launcher: MockLauncher,
        notifier: CollectNotifier,
        hub: Arc<ObserverHub>,
        dir: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                config: SessionConfig::default(),
                launcher: MockLauncher::new(),
                notifier: CollectNotifier::new(),
                hub: Arc::new(ObserverHub::default()),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn rules(&mut self, mode: SessionMode, rules: ModeRules) {
            self.config.mode = mode;
            match mode {
                SessionMode::Autonomous => self.config.rules.autonomous = rules,
                SessionMode::Assisted => self.config.rules.assisted = rules,
            }
        }

        async fn run(&self, queue: &Queue) -> SessionReport {
            self.run_with_cancel(queue, CancellationToken::new()).await
        }

        async fn run_with_cancel(&self, queue: &Queue, cancel: CancellationToken) -> SessionReport {
            SessionRunner::new(
                &self.config,
                &self.launcher,
                &self.notifier,
                self.hub.clone(),
                self.dir.path(),
            )
            .run(queue, cancel)
            .await
            .unwrap()
        }

        fn events(&self, report: &SessionReport) -> Vec<serde_json::Value> {
            std::fs::read_to_string(&report.events_path)
                .unwrap()
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    fn queue(ids: &[&str]) -> Queue {
        Queue {
            name: "test".into(),
            context: vec![],
            tasks: ids.iter().map(|id| Task::new(*id, format!("do {id}"))).collect(),
        }
    }

    fn status(report: &SessionReport, id: &str) -> TaskStatus {
        report.tasks.iter().find(|t| t.id == id).unwrap().status
    }

    /// Answer every approval request with `verdict` as soon as it appears.
    fn auto_answer(hub: Arc<ObserverHub>, verdict: Verdict) {
        let mut sub = hub.subscribe();
        let control = SessionControl::new(hub);
        tokio::spawn(async move {
            loop {
                match sub.events.recv().await {
                    Ok(event) if event.kind == "approval_requested" => {
                        let id = event.data["id"].as_str().unwrap_or_default().to_string();
                        control.apply(match verdict {
                            Verdict::Approve => ControlCommand::Approve(id),
                            Verdict::Deny => ControlCommand::Deny(id),
                        });
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    #[tokio::test]
    async fn all_tasks_complete() {
        let h = Harness::new();
        let report = h.run(&queue(&["a", "b", "c"])).await;

        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(report.stats.tasks_completed, 3);
        assert_eq!(report.stats.errors, 0);
        assert!(report.tasks.iter().all(|t| t.status == TaskStatus::Complete));
        assert!(report.tasks.iter().all(|t| t.finished_at.is_some()));
        assert!(h
            .notifier
            .messages()
            .iter()
            .any(|m| m.contains("Session completed")));
    }

    #[tokio::test]
    async fn runs_in_priority_order() {
        let h = Harness::new();
        let mut q = queue(&["n1", "l1", "h1", "n2", "h2"]);
        q.tasks[1].priority = Priority::Low;
        q.tasks[2].priority = Priority::High;
        q.tasks[4].priority = Priority::High;
        h.run(&q).await;
        assert_eq!(h.launcher.launched_ids(), vec!["h1", "h2", "n1", "n2", "l1"]);
    }

    #[tokio::test]
    async fn prompt_layers_context() {
        let mut h = Harness::new();
        h.config.context = vec![ContextSection {
            title: Some("Rules".into()),
            body: "No force pushes.".into(),
        }];
        let q = parse_queue(
            r#"
name: q
context: ["Monorepo."]
tasks:
  - id: a
    prompt: Fix the build
    context: CI is red since Tuesday.
"#,
            "q",
        )
        .unwrap();
        h.run(&q).await;
        let (_, prompt) = &h.launcher.launched()[0];
        assert_eq!(
            prompt,
            "## Rules\nNo force pushes.\n\nMonorepo.\n\nCI is red since Tuesday.\n\nFix the build"
        );
    }

    #[tokio::test]
    async fn error_limit_stops_session() {
        let mut h = Harness::new();
        h.config.rules.stop_on.error_count = 2;
        h.launcher.set_script("a", vec![AgentEvent::exit(1)]);
        h.launcher.set_script("b", vec![AgentEvent::exit(1)]);

        let report = h.run(&queue(&["a", "b", "c"])).await;

        assert_eq!(h.launcher.launched_ids(), vec!["a", "b"]);
        assert_eq!(report.stats.tasks_failed, 2);
        assert_eq!(report.stats.errors, 2);
        assert_eq!(status(&report, "c"), TaskStatus::Pending);
        assert_eq!(report.pending(), 1);
        assert!(matches!(report.outcome, SessionOutcome::Stopped { .. }));
        assert_eq!(
            report.tasks[0].error.as_deref(),
            Some("agent exited with code 1")
        );
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error() {
        let h = Harness::new();
        h.launcher.fail_spawn("a", "agent binary missing");
        let report = h.run(&queue(&["a", "b"])).await;

        assert_eq!(status(&report, "a"), TaskStatus::Failed);
        assert!(report.tasks[0]
            .error
            .as_deref()
            .unwrap()
            .contains("agent binary missing"));
        assert_eq!(report.stats.errors, 1);
        assert_eq!(status(&report, "b"), TaskStatus::Complete);
    }

    #[tokio::test]
    async fn accepted_actions_are_counted() {
        let mut h = Harness::new();
        h.rules(
            SessionMode::Autonomous,
            ModeRules {
                auto_accept: vec![ActionType::NpmInstall, ActionType::FileEdit],
                ..Default::default()
            },
        );
        h.launcher.set_script(
            "a",
            vec![
                AgentEvent::stdout("Let me look at the project layout first."),
                AgentEvent::stdout("npm install lodash"),
                AgentEvent::stderr("Editing file src/index.ts"),
                AgentEvent::exit(0),
            ],
        );
        let report = h.run(&queue(&["a"])).await;

        assert_eq!(report.stats.actions_approved, 2);
        assert_eq!(report.stats.files_changed, 1);
        assert_eq!(report.stats.actions_denied, 0);
        assert_eq!(report.insights.total_actions(), 2);
        assert_eq!(h.hub.snapshot().recent_actions.len(), 2);
    }

    #[tokio::test]
    async fn approved_pause_lets_task_continue() {
        let mut h = Harness::new();
        h.rules(
            SessionMode::Autonomous,
            ModeRules {
                auto_accept: vec![ActionType::FileDelete],
                ..Default::default()
            },
        );
        h.launcher.set_script(
            "a",
            vec![
                AgentEvent::stdout("Deleting file: .env"),
                AgentEvent::stdout("Editing file README.md"),
                AgentEvent::exit(0),
            ],
        );
        auto_answer(h.hub.clone(), Verdict::Approve);

        let report = h.run(&queue(&["a"])).await;

        assert_eq!(status(&report, "a"), TaskStatus::Complete);
        assert_eq!(report.stats.actions_denied, 1);
        assert!(h.hub.approvals().pending().is_empty());
        let requested: Vec<_> = h
            .notifier
            .events()
            .into_iter()
            .filter(|e| matches!(e, NotifyEvent::ApprovalRequested { .. }))
            .collect();
        assert_eq!(requested.len(), 1);

        let events = h.events(&report);
        let resolved = events
            .iter()
            .find(|e| e["type"] == "approval_resolved")
            .unwrap();
        assert_eq!(resolved["resolution"], "approved");
    }

    #[tokio::test]
    async fn denied_approval_fails_task_without_error() {
        let mut h = Harness::new();
        h.rules(
            SessionMode::Autonomous,
            ModeRules {
                require_approval: vec![ActionType::GitPush],
                ..Default::default()
            },
        );
        h.launcher.set_script(
            "a",
            vec![
                AgentEvent::stdout("git push origin feature/x"),
                AgentEvent::stdout("pushed"),
            ],
        );
        auto_answer(h.hub.clone(), Verdict::Deny);

        let report = h.run(&queue(&["a", "b"])).await;

        assert_eq!(status(&report, "a"), TaskStatus::Failed);
        assert_eq!(report.tasks[0].error.as_deref(), Some("action denied"));
        assert_eq!(report.stats.errors, 0);
        assert_eq!(status(&report, "b"), TaskStatus::Complete);
        assert_eq!(report.outcome, SessionOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn approval_timeout_denies() {
        let mut h = Harness::new();
        h.rules(
            SessionMode::Autonomous,
            ModeRules {
                require_approval: vec![ActionType::FileDelete],
                ..Default::default()
            },
        );
        h.launcher
            .set_script("a", vec![AgentEvent::stdout("Removing file old/legacy.rs")]);

        let report = h.run(&queue(&["a"])).await;

        assert_eq!(report.tasks[0].error.as_deref(), Some("action denied"));
        let events = h.events(&report);
        assert!(events
            .iter()
            .any(|e| e["type"] == "approval_resolved" && e["resolution"] == "timed_out"));
    }

    #[tokio::test]
    async fn assisted_deny_does_not_block() {
        let mut h = Harness::new();
        h.config.mode = SessionMode::Assisted;
        h.launcher.set_script(
            "a",
            vec![AgentEvent::stdout("rm -rf /important"), AgentEvent::exit(0)],
        );

        let report = h.run(&queue(&["a"])).await;

        assert_eq!(report.stats.actions_denied, 1);
        assert_eq!(report.stats.actions_approved, 0);
        assert_eq!(status(&report, "a"), TaskStatus::Complete);
        assert!(h.hub.approvals().pending().is_empty());
        let events = h.events(&report);
        let action = events
            .iter()
            .find(|e| e["type"] == "action_detected")
            .unwrap();
        assert_eq!(action["action_type"], "dangerous_command");
        assert_eq!(action["level"], "critical");
        assert_eq!(action["outcome"], "deny");
    }

    #[tokio::test]
    async fn unknown_action_stops_session() {
        let mut h = Harness::new();
        h.rules(
            SessionMode::Autonomous,
            ModeRules {
                auto_accept: vec![ActionType::FileEdit],
                ..Default::default()
            },
        );
        h.config.rules.stop_on.unknown_action = true;
        h.launcher.set_script(
            "a",
            vec![AgentEvent::stdout("git commit -m 'wip'"), AgentEvent::exit(0)],
        );

        let report = h.run(&queue(&["a", "b"])).await;

        assert!(matches!(report.outcome, SessionOutcome::Stopped { .. }));
        assert_eq!(status(&report, "a"), TaskStatus::Failed);
        assert!(report.tasks[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("stopped: unknown action"));
        assert_eq!(status(&report, "b"), TaskStatus::Pending);
        assert_eq!(report.stats.errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn task_timeout_is_an_error() {
        let mut h = Harness::new();
        h.config.agent.timeout_sec = 10;
        h.launcher
            .set_script("a", vec![AgentEvent::stdout("thinking...")]);

        let report = h.run(&queue(&["a"])).await;

        assert_eq!(status(&report, "a"), TaskStatus::Failed);
        assert_eq!(report.tasks[0].error.as_deref(), Some("timed out after 10s"));
        assert_eq!(report.stats.errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn quick_confirm_accepts_after_grace() {
        let mut h = Harness::new();
        h.rules(
            SessionMode::Assisted,
            ModeRules {
                quick_confirm: vec![ActionType::CommandRun],
                ..Default::default()
            },
        );
        h.config.rules.timing.quick_confirm_ms = 2000;
        h.launcher.set_script(
            "a",
            vec![AgentEvent::stdout("$ cargo build --release"), AgentEvent::exit(0)],
        );

        let started = tokio::time::Instant::now();
        let report = h.run(&queue(&["a"])).await;

        assert_eq!(report.stats.actions_approved, 1);
        assert!(started.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_nothing() {
        let h = Harness::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = h.run_with_cancel(&queue(&["a", "b"]), cancel).await;

        assert_eq!(report.outcome, SessionOutcome::Cancelled);
        assert!(h.launcher.launched().is_empty());
        assert!(report.tasks.iter().all(|t| t.status == TaskStatus::Pending));
    }

    #[tokio::test]
    async fn cancel_terminates_running_task() {
        let h = Harness::new();
        h.launcher
            .set_script("a", vec![AgentEvent::stdout("Editing file src/lib.rs")]);
        let cancel = CancellationToken::new();
        {
            let cancel = cancel.clone();
            let mut sub = h.hub.subscribe();
            tokio::spawn(async move {
                while let Ok(event) = sub.events.recv().await {
                    if event.kind == "action" {
                        cancel.cancel();
                        break;
                    }
                }
            });
        }
        let report = h.run_with_cancel(&queue(&["a", "b"]), cancel).await;

        assert_eq!(report.outcome, SessionOutcome::Cancelled);
        assert_eq!(status(&report, "a"), TaskStatus::Failed);
        assert_eq!(report.tasks[0].error.as_deref(), Some("cancelled"));
        assert_eq!(status(&report, "b"), TaskStatus::Pending);
        assert_eq!(h.launcher.launched_ids(), vec!["a"]);
        assert_eq!(report.stats.errors, 0);
    }

    #[tokio::test]
    async fn pause_holds_at_task_boundary() {
        let h = Harness::new();
        let control = SessionControl::new(h.hub.clone());
        control.apply(ControlCommand::Pause);

        let mut sub = h.hub.subscribe();
        let resumer = {
            let control = control.clone();
            tokio::spawn(async move {
                loop {
                    match sub.events.recv().await {
                        Ok(e) if e.kind == "session_paused" => break,
                        Ok(_) => {}
                        Err(_) => return false,
                    }
                }
                control.apply(ControlCommand::Resume)
            })
        };

        let report = h.run(&queue(&["a"])).await;
        assert!(resumer.await.unwrap());
        assert_eq!(status(&report, "a"), TaskStatus::Complete);
        let kinds: Vec<String> = h
            .events(&report)
            .iter()
            .map(|e| e["type"].as_str().unwrap().to_string())
            .collect();
        let paused = kinds.iter().position(|k| k == "session_paused").unwrap();
        let resumed = kinds.iter().position(|k| k == "session_resumed").unwrap();
        let started = kinds.iter().position(|k| k == "task_start").unwrap();
        assert!(paused < resumed && resumed < started, "{kinds:?}");
    }

    #[tokio::test]
    async fn event_log_and_insights() {
        let mut h = Harness::new();
        h.rules(
            SessionMode::Autonomous,
            ModeRules {
                auto_accept: vec![ActionType::FileEdit],
                ..Default::default()
            },
        );
        h.launcher.set_script(
            "a",
            vec![
                AgentEvent::stdout("Editing file src/a.rs"),
                AgentEvent::stdout("Editing file src/a.rs"),
                AgentEvent::stdout("Editing file src/b.rs"),
                AgentEvent::exit(0),
            ],
        );
        let report = h.run(&queue(&["a"])).await;

        assert_eq!(report.insights.action_types[&ActionType::FileEdit], 3);
        assert_eq!(report.insights.top_targets[0].target, "src/a.rs");
        assert_eq!(report.insights.top_targets[0].count, 2);

        assert!(report
            .events_path
            .ends_with(format!(".warden/sessions/{}/events.jsonl", report.session_id)));
        let events = h.events(&report);
        assert_eq!(events.first().unwrap()["type"], "session_start");
        assert_eq!(events.last().unwrap()["type"], "session_end");
        assert_eq!(events.last().unwrap()["outcome"], "completed");
        let seqs: Vec<u64> = events.iter().map(|e| e["seq"].as_u64().unwrap()).collect();
        assert_eq!(seqs, (0..events.len() as u64).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn missing_cwd_is_rejected() {
        let h = Harness::new();
        let missing = h.dir.path().join("nope");
        let err = SessionRunner::new(&h.config, &h.launcher, &h.notifier, h.hub.clone(), &missing)
            .run(&queue(&["a"]), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn compose_prompt_without_context_is_body() {
        let t = Task::new("a", "just do it");
        assert_eq!(compose_prompt(&[], &[], &t), "just do it");
    }

    #[test]
    fn ordered_tasks_is_stable() {
        let tasks = vec![
            Task::new("1", "x").with_priority(Priority::Low),
            Task::new("2", "x"),
            Task::new("3", "x").with_priority(Priority::Low),
            Task::new("4", "x"),
        ];
        let ids: Vec<_> = ordered_tasks(&tasks).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["2", "4", "1", "3"]);
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_secs(5)), "5s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m5s");
    }
}
