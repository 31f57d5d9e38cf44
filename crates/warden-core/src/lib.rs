pub mod action;
pub mod decision;
pub mod error;
pub mod history;
pub mod risk;
pub mod stats;
pub mod task;

pub use action::{ActionEvent, ActionType, Danger, Severity};
pub use decision::{Decision, Outcome, PolicyRuling, SessionMode, Verdict};
pub use error::WardenError;
pub use history::{HistoryStats, TargetStats};
pub use risk::{RiskAssessment, RiskFactor, RiskLevel};
pub use stats::{SessionInsights, SessionStats, TargetTouches};
pub use task::{Priority, Task, TaskStatus};

/// Current UTC time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
