//! Pure decision function: (action, risk, rules, mode) → ruling.
//!
//! Rules are evaluated in a fixed order and the first match wins:
//! critical risk, require-approval, auto-accept (with a high-score override),
//! quick-confirm (assisted only), unknown-action stop, then a score threshold.

mod rules;

pub use rules::{ModeRules, RuleConfig, StopOn, Timing};

use warden_core::{
    ActionEvent, Decision, Outcome, PolicyRuling, RiskAssessment, RiskLevel, SessionMode,
};

/// Auto-accepted actions scoring above this are escalated.
pub const AUTO_ACCEPT_CEILING: f64 = 0.7;
/// Unlisted actions are accepted below this score.
pub const DEFAULT_ACCEPT_BELOW: f64 = 0.5;

pub fn decide(
    action: &ActionEvent,
    risk: &RiskAssessment,
    rules: &RuleConfig,
    mode: SessionMode,
) -> PolicyRuling {
    let mode_rules = rules.for_mode(mode);
    let action_type = action.action_type;

    if action.is_dangerous() || risk.level == RiskLevel::Critical {
        return decided(Outcome::Deny, "critical risk detected", 1.0);
    }

    if mode_rules.require_approval.contains(&action_type) {
        return decided(gate(mode), "action type requires approval", 0.9);
    }

    if mode_rules.auto_accept.contains(&action_type) {
        if risk.score > AUTO_ACCEPT_CEILING {
            return decided(
                gate(mode),
                format!(
                    "auto-accept overridden: risk score {:.2} exceeds {AUTO_ACCEPT_CEILING:.2}",
                    risk.score
                ),
                risk.score,
            );
        }
        return decided(Outcome::Accept, "action type auto-accepted", 0.9);
    }

    if mode == SessionMode::Assisted && mode_rules.quick_confirm.contains(&action_type) {
        return decided(
            Outcome::QuickConfirm {
                timeout_ms: rules.timing.quick_confirm_ms,
            },
            "quick confirm window",
            1.0 - risk.score,
        );
    }

    if mode == SessionMode::Autonomous
        && rules.stop_on.unknown_action
        && !mode_rules.mentions(action_type)
    {
        return PolicyRuling::Stop {
            reason: format!("unknown action: {action_type}"),
        };
    }

    let outcome = if risk.score < DEFAULT_ACCEPT_BELOW {
        Outcome::Accept
    } else {
        Outcome::Deny
    };
    decided(
        outcome,
        format!("default policy at risk score {:.2}", risk.score),
        1.0 - risk.score,
    )
}

/// What a gated action turns into: a pause for approval when unattended,
/// a denial pending confirmation when a human is watching.
fn gate(mode: SessionMode) -> Outcome {
    match mode {
        SessionMode::Autonomous => Outcome::Pause,
        SessionMode::Assisted => Outcome::Deny,
    }
}

fn decided(outcome: Outcome, reason: impl Into<String>, confidence: f64) -> PolicyRuling {
    PolicyRuling::Decide(Decision::new(outcome, reason, confidence))
}
