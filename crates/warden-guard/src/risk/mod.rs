//! Composite risk scoring: a per-type base risk plus named, signed factors,
//! clamped into `[0, 1]`.

mod factors;

pub use factors::FactorInput;

use factors::Factor;
use warden_core::{ActionEvent, ActionType, HistoryStats, RiskAssessment, RiskFactor, Severity};

/// Score for a dangerous match of critical severity (or unknown severity).
pub const DANGEROUS_CRITICAL_SCORE: f64 = 1.0;
/// Score for a dangerous match of high severity.
pub const DANGEROUS_HIGH_SCORE: f64 = 0.9;

struct RiskProfile {
    base: f64,
    factors: &'static [Factor],
}

fn profile(action_type: ActionType) -> RiskProfile {
    let (base, factors) = match action_type {
        ActionType::FileCreate => (0.10, factors::FILE_CREATE),
        ActionType::FileEdit => (0.20, factors::FILE_EDIT),
        ActionType::FileDelete => (0.40, factors::FILE_DELETE),
        ActionType::NpmInstall | ActionType::PackageInstall => (0.30, factors::INSTALL),
        ActionType::CommandRun => (0.30, factors::COMMAND),
        ActionType::GitCommit => (0.15, factors::GIT_COMMIT),
        ActionType::GitPush => (0.50, factors::GIT_PUSH),
        ActionType::NetworkRequest => (0.40, factors::NETWORK),
        ActionType::DangerousCommand => (DANGEROUS_CRITICAL_SCORE, &[][..]),
    };
    RiskProfile { base, factors }
}

/// Base risk declared for an action type.
pub fn base_risk(action_type: ActionType) -> f64 {
    profile(action_type).base
}

/// Score an action from its parts.
///
/// `DangerousCommand` carries no severity here and scores as critical.
pub fn score(
    action_type: ActionType,
    target: &str,
    raw_text: &str,
    history: &HistoryStats,
) -> RiskAssessment {
    if action_type == ActionType::DangerousCommand {
        return RiskAssessment::critical(DANGEROUS_CRITICAL_SCORE);
    }

    let profile = profile(action_type);
    let input = FactorInput {
        action_type,
        target,
        raw_text,
        history,
    };
    let contributions = profile
        .factors
        .iter()
        .filter_map(|factor| {
            let value = (factor.eval)(&input)?;
            if !value.is_finite() {
                tracing::warn!(factor = factor.name, "risk factor returned {value}, skipped");
                return None;
            }
            (value != 0.0).then(|| RiskFactor {
                name: factor.name.to_string(),
                contribution: value,
            })
        })
        .collect();

    RiskAssessment::compose(profile.base, contributions)
}

/// Score a classified action, honouring the severity of dangerous matches.
pub fn assess(event: &ActionEvent, history: &HistoryStats) -> RiskAssessment {
    if event.is_dangerous() {
        let score = match event.danger.as_ref().map(|d| d.severity) {
            Some(Severity::High) => DANGEROUS_HIGH_SCORE,
            Some(Severity::Critical) | None => DANGEROUS_CRITICAL_SCORE,
        };
        return RiskAssessment::critical(score);
    }
    score(event.action_type, &event.target, &event.raw_text, history)
}
