use serde::{Deserialize, Serialize};

/// How much the human is in the loop for a session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Unattended run; risky actions are paused for approval.
    #[default]
    Autonomous,
    /// A human is watching; risky actions are denied pending confirmation.
    Assisted,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Autonomous => "autonomous",
            SessionMode::Assisted => "assisted",
        }
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "autonomous" => Ok(SessionMode::Autonomous),
            "assisted" => Ok(SessionMode::Assisted),
            other => Err(format!(
                "unknown mode \"{other}\". Valid modes: autonomous, assisted"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Accept,
    Deny,
    Pause,
    /// Accepted after `timeout_ms` unless intercepted.
    QuickConfirm { timeout_ms: u64 },
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Accept => "accept",
            Outcome::Deny => "deny",
            Outcome::Pause => "pause",
            Outcome::QuickConfirm { .. } => "quick_confirm",
        }
    }
}

/// Output of the policy engine for one action. Logged and acted on, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub reason: String,
    /// In `[0, 1]`.
    pub confidence: f64,
}

impl Decision {
    pub fn new(outcome: Outcome, reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            outcome,
            reason: reason.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn is_accept(&self) -> bool {
        self.outcome == Outcome::Accept
    }
}

/// Policy result: either a per-action decision or a request to end the session.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyRuling {
    Decide(Decision),
    Stop { reason: String },
}

impl PolicyRuling {
    pub fn decision(&self) -> Option<&Decision> {
        match self {
            PolicyRuling::Decide(d) => Some(d),
            PolicyRuling::Stop { .. } => None,
        }
    }
}

/// Human (or channel) answer to a pending approval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    Deny,
}

impl Verdict {
    pub fn is_approved(self) -> bool {
        self == Verdict::Approve
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_flattens_outcome() {
        let d = Decision::new(
            Outcome::QuickConfirm { timeout_ms: 3000 },
            "quick confirm window",
            0.7,
        );
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains(r#""outcome":"quick_confirm""#), "{json}");
        assert!(json.contains(r#""timeout_ms":3000"#), "{json}");
    }

    #[test]
    fn confidence_is_clamped() {
        let d = Decision::new(Outcome::Accept, "ok", 1.4);
        assert_eq!(d.confidence, 1.0);
        let d = Decision::new(Outcome::Deny, "no", -0.2);
        assert_eq!(d.confidence, 0.0);
    }

    #[test]
    fn mode_parse() {
        assert_eq!(
            "assisted".parse::<SessionMode>().unwrap(),
            SessionMode::Assisted
        );
        assert!("yolo".parse::<SessionMode>().is_err());
    }

    #[test]
    fn stop_ruling_has_no_decision() {
        let r = PolicyRuling::Stop {
            reason: "unknown".into(),
        };
        assert!(r.decision().is_none());
    }
}
