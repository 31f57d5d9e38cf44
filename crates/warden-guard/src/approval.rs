//! Approvals that wait on an external actor.
//!
//! Each paused action gets an `apr_<ulid>` id and a one-shot channel. Any
//! control surface (observer, CLI prompt, chat button) answers by calling
//! [`ApprovalCoordinator::resolve`]; the waiting side receives the verdict, or
//! falls back to deny on timeout or cancellation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use warden_core::{now_rfc3339, ActionEvent, Verdict};

/// An approval awaiting an answer, as listed by [`ApprovalCoordinator::pending`].
#[derive(Debug, Clone, Serialize)]
pub struct PendingApproval {
    pub id: String,
    pub action: ActionEvent,
    pub created_at: String,
    /// Always `false` in a snapshot: resolving removes the entry, so a settled
    /// approval is never listed.
    pub resolved: bool,
}

/// Returned by [`ApprovalCoordinator::register`]; consumed by
/// [`ApprovalCoordinator::await_resolution`].
#[derive(Debug)]
pub struct ApprovalHandle {
    id: String,
    rx: oneshot::Receiver<Verdict>,
}

impl ApprovalHandle {
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved(Verdict),
    TimedOut,
    Cancelled,
}

impl Resolution {
    /// The effective verdict. Anything but an explicit answer is a denial.
    pub fn verdict(self) -> Verdict {
        match self {
            Resolution::Resolved(v) => v,
            Resolution::TimedOut | Resolution::Cancelled => Verdict::Deny,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Resolved(Verdict::Approve) => "approved",
            Resolution::Resolved(Verdict::Deny) => "denied",
            Resolution::TimedOut => "timed_out",
            Resolution::Cancelled => "cancelled",
        }
    }
}

struct Entry {
    approval: PendingApproval,
    tx: oneshot::Sender<Verdict>,
}

#[derive(Default)]
pub struct ApprovalCoordinator {
    entries: Mutex<HashMap<String, Entry>>,
}

impl ApprovalCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open an approval for `action`.
    pub fn register(&self, action: ActionEvent) -> ApprovalHandle {
        let id = format!("apr_{}", ulid::Ulid::new());
        let (tx, rx) = oneshot::channel();
        let approval = PendingApproval {
            id: id.clone(),
            action,
            created_at: now_rfc3339(),
            resolved: false,
        };
        self.lock().insert(id.clone(), Entry { approval, tx });
        tracing::debug!(id = %id, "approval registered");
        ApprovalHandle { id, rx }
    }

    /// Answer an approval. Returns `true` only for the first effective
    /// resolution; unknown or already-resolved ids are a no-op.
    pub fn resolve(&self, id: &str, verdict: Verdict) -> bool {
        let Some(entry) = self.lock().remove(id) else {
            tracing::debug!(id, "resolve for unknown or settled approval ignored");
            return false;
        };
        // The waiter may already be gone; the entry is settled either way.
        let _ = entry.tx.send(verdict);
        tracing::info!(id, ?verdict, "approval resolved");
        true
    }

    /// Wait for a verdict, the timeout, or cancellation, whichever comes first.
    pub async fn await_resolution(
        &self,
        handle: ApprovalHandle,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Resolution {
        let ApprovalHandle { id, mut rx } = handle;

        let resolution = tokio::select! {
            biased;
            verdict = &mut rx => match verdict {
                Ok(v) => Resolution::Resolved(v),
                Err(_) => Resolution::Cancelled,
            },
            _ = tokio::time::sleep(timeout) => Resolution::TimedOut,
            _ = cancel.cancelled() => Resolution::Cancelled,
        };

        if let Resolution::Resolved(_) = resolution {
            return resolution;
        }
        if self.lock().remove(&id).is_some() {
            tracing::warn!(id = %id, "approval {}, defaulting to deny", resolution.as_str());
            return resolution;
        }
        // Resolved concurrently with the timeout; honour the answer.
        match rx.try_recv() {
            Ok(v) => Resolution::Resolved(v),
            Err(_) => resolution,
        }
    }

    /// Outstanding approvals, oldest first.
    pub fn pending(&self) -> Vec<PendingApproval> {
        let mut pending: Vec<PendingApproval> =
            self.lock().values().map(|e| e.approval.clone()).collect();
        pending.sort_by(|a, b| (&a.created_at, &a.id).cmp(&(&b.created_at, &b.id)));
        pending
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }
}

impl std::fmt::Debug for ApprovalCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalCoordinator")
            .field("pending", &self.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use warden_core::ActionType;

    fn action(target: &str) -> ActionEvent {
        ActionEvent {
            action_type: ActionType::FileDelete,
            target: target.into(),
            raw_text: format!("Deleting file: {target}"),
            confidence: 0.9,
            timestamp: now_rfc3339(),
            danger: None,
        }
    }

    #[test]
    fn register_assigns_unique_ids() {
        let c = ApprovalCoordinator::new();
        let a = c.register(action("a"));
        let b = c.register(action("b"));
        assert!(a.id().starts_with("apr_"));
        assert_ne!(a.id(), b.id());
        let pending = c.pending();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|p| !p.resolved));
    }

    #[tokio::test]
    async fn resolve_delivers_verdict() {
        let c = Arc::new(ApprovalCoordinator::new());
        let handle = c.register(action(".env"));
        let id = handle.id().to_string();

        let resolver = {
            let c = c.clone();
            tokio::spawn(async move { c.resolve(&id, Verdict::Approve) })
        };
        let res = c
            .await_resolution(handle, Duration::from_secs(5), &CancellationToken::new())
            .await;
        assert!(resolver.await.unwrap());
        assert_eq!(res, Resolution::Resolved(Verdict::Approve));
        assert!(c.pending().is_empty());
    }

    #[test]
    fn resolve_is_idempotent() {
        let c = ApprovalCoordinator::new();
        let handle = c.register(action("x"));
        assert!(c.resolve(handle.id(), Verdict::Deny));
        assert!(!c.resolve(handle.id(), Verdict::Approve));
        assert!(!c.resolve("apr_unknown", Verdict::Approve));
        assert!(c.pending().is_empty());
    }

    #[test]
    fn settled_approvals_leave_the_snapshot() {
        let c = ApprovalCoordinator::new();
        let kept = c.register(action("keep"));
        let settled = c.register(action("settle"));
        let before = c.pending();
        assert!(c.resolve(settled.id(), Verdict::Approve));

        // earlier snapshots are copies and stay untouched
        assert_eq!(before.len(), 2);
        assert!(before.iter().all(|p| !p.resolved));

        let after = c.pending();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, kept.id());
        assert!(!after[0].resolved);
        assert!(!c.is_pending(settled.id()));
        assert!(c.is_pending(kept.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_defaults_to_deny() {
        let c = ApprovalCoordinator::new();
        let handle = c.register(action("x"));
        let id = handle.id().to_string();
        let res = c
            .await_resolution(handle, Duration::from_secs(300), &CancellationToken::new())
            .await;
        assert_eq!(res, Resolution::TimedOut);
        assert_eq!(res.verdict(), Verdict::Deny);
        assert!(!c.is_pending(&id));
        // late answers are a no-op
        assert!(!c.resolve(&id, Verdict::Approve));
    }

    #[tokio::test]
    async fn cancellation_defaults_to_deny() {
        let c = ApprovalCoordinator::new();
        let handle = c.register(action("x"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = c
            .await_resolution(handle, Duration::from_secs(300), &cancel)
            .await;
        assert_eq!(res, Resolution::Cancelled);
        assert_eq!(res.verdict(), Verdict::Deny);
        assert!(c.pending().is_empty());
    }

    #[tokio::test]
    async fn verdict_sent_before_waiting_is_kept() {
        let c = ApprovalCoordinator::new();
        let handle = c.register(action("x"));
        assert!(c.resolve(handle.id(), Verdict::Approve));
        let res = c
            .await_resolution(handle, Duration::from_millis(10), &CancellationToken::new())
            .await;
        assert_eq!(res, Resolution::Resolved(Verdict::Approve));
    }
}
