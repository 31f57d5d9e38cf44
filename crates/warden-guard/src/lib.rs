//! The decision path for a single observed action:
//! classify → score → decide → (optionally) wait for approval.

pub mod approval;
pub mod classify;
pub mod policy;
pub mod risk;

pub use approval::{ApprovalCoordinator, ApprovalHandle, PendingApproval, Resolution};
pub use classify::Classifier;
pub use policy::{decide, ModeRules, RuleConfig, StopOn, Timing};
pub use risk::{assess, score};
