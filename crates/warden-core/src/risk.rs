use serde::{Deserialize, Serialize};

/// Five-step discretization of a risk score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Fixed threshold ladder; not configurable.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            RiskLevel::Critical
        } else if score >= 0.6 {
            RiskLevel::High
        } else if score >= 0.4 {
            RiskLevel::Medium
        } else if score >= 0.2 {
            RiskLevel::Low
        } else {
            RiskLevel::Minimal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Minimal => "minimal",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named contribution to a risk score. May be negative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskFactor {
    pub name: String,
    pub contribution: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    /// `clamp(base + Σ factors, 0, 1)`.
    pub score: f64,
    pub level: RiskLevel,
    pub base: f64,
    #[serde(default)]
    pub factors: Vec<RiskFactor>,
}

impl RiskAssessment {
    /// Build an assessment from a base risk and its contributions.
    pub fn compose(base: f64, factors: Vec<RiskFactor>) -> Self {
        let total = base + factors.iter().map(|f| f.contribution).sum::<f64>();
        let score = if total.is_nan() {
            1.0
        } else {
            total.clamp(0.0, 1.0)
        };
        Self {
            score,
            level: RiskLevel::from_score(score),
            base,
            factors,
        }
    }

    /// A fixed score that always maps to `Critical`.
    pub fn critical(score: f64) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            level: RiskLevel::Critical,
            base: score,
            factors: Vec::new(),
        }
    }

    pub fn has_factor(&self, name: &str) -> bool {
        self.factors.iter().any(|f| f.name == name)
    }
}
