//! Maps a chunk of agent output to at most one typed action.
//!
//! Every action type proposes at most one candidate (its first matching
//! pattern); dangerous patterns propose candidates at confidence 1.0. The
//! highest confidence wins, earlier declarations win ties, and dangerous
//! candidates are declared first.

mod table;

use regex::{Captures, Regex};
use warden_core::{now_rfc3339, ActionEvent, ActionType, Danger, HistoryStats, Severity};

use table::{Extract, DANGEROUS, RULES};

struct CompiledPattern {
    regex: Regex,
    confidence: f64,
    extract: Extract,
}

struct CompiledRule {
    action_type: ActionType,
    patterns: Vec<CompiledPattern>,
}

struct CompiledDanger {
    regex: Regex,
    reason: &'static str,
    severity: Severity,
}

pub struct Classifier {
    rules: Vec<CompiledRule>,
    dangerous: Vec<CompiledDanger>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    /// Compile the built-in table. Invalid patterns are logged and skipped.
    pub fn new() -> Self {
        let rules = RULES
            .iter()
            .map(|rule| CompiledRule {
                action_type: rule.action_type,
                patterns: rule
                    .patterns
                    .iter()
                    .filter_map(|spec| {
                        if !(spec.confidence > 0.0 && spec.confidence <= 1.0) {
                            tracing::warn!(
                                "skipping {} pattern {:?}: confidence {} out of range",
                                rule.action_type,
                                spec.regex,
                                spec.confidence
                            );
                            return None;
                        }
                        compile(spec.regex).map(|regex| CompiledPattern {
                            regex,
                            confidence: spec.confidence,
                            extract: spec.extract,
                        })
                    })
                    .collect(),
            })
            .collect();

        let dangerous = DANGEROUS
            .iter()
            .filter_map(|spec| {
                compile(spec.regex).map(|regex| CompiledDanger {
                    regex,
                    reason: spec.reason,
                    severity: if spec.critical {
                        Severity::Critical
                    } else {
                        Severity::High
                    },
                })
            })
            .collect();

        Self { rules, dangerous }
    }

    /// All candidates for `text`, in tie-break order. Does not touch history.
    pub fn scan(&self, text: &str) -> Vec<ActionEvent> {
        let mut candidates = Vec::new();
        for danger in &self.dangerous {
            if let Some(m) = danger.regex.find(text) {
                candidates.push(ActionEvent {
                    action_type: ActionType::DangerousCommand,
                    target: m.as_str().trim().to_string(),
                    raw_text: text.to_string(),
                    confidence: 1.0,
                    timestamp: now_rfc3339(),
                    danger: Some(Danger {
                        reason: danger.reason.to_string(),
                        severity: danger.severity,
                    }),
                });
            }
        }
        for rule in &self.rules {
            if let Some(candidate) = match_rule(rule, text) {
                candidates.push(candidate);
            }
        }
        candidates
    }

    /// Classify one chunk. A selected action is recorded in `history`.
    pub fn detect(&self, text: &str, history: &mut HistoryStats) -> Option<ActionEvent> {
        let selected = select(self.scan(text))?;
        history.record(&selected);
        tracing::debug!(
            action = %selected.action_type,
            target = %selected.target,
            confidence = selected.confidence,
            "classified action"
        );
        Some(selected)
    }
}

fn compile(source: &str) -> Option<Regex> {
    match Regex::new(source) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!("skipping invalid action pattern {source:?}: {e}");
            None
        }
    }
}

/// The single dispatch point: first matching pattern speaks for the type.
/// A match whose target cannot be extracted drops the candidate.
fn match_rule(rule: &CompiledRule, text: &str) -> Option<ActionEvent> {
    let (pattern, caps) = rule
        .patterns
        .iter()
        .find_map(|p| p.regex.captures(text).map(|caps| (p, caps)))?;
    let target = extract_target(&caps, pattern.extract)?;
    Some(ActionEvent {
        action_type: rule.action_type,
        target,
        raw_text: text.to_string(),
        confidence: pattern.confidence,
        timestamp: now_rfc3339(),
        danger: None,
    })
}

fn extract_target(caps: &Captures<'_>, extract: Extract) -> Option<String> {
    let raw = match extract {
        Extract::Group(i) => caps.get(i).map(|m| m.as_str()),
        Extract::GroupOr(i, fallback) => Some(
            caps.get(i)
                .map(|m| m.as_str())
                .filter(|s| !clean(s).is_empty())
                .unwrap_or(fallback),
        ),
        Extract::Whole => caps.get(0).map(|m| m.as_str()),
    }?;
    let target = clean(raw);
    if target.is_empty() {
        None
    } else {
        Some(target.to_string())
    }
}

/// Strip whitespace, quotes and trailing sentence punctuation.
fn clean(s: &str) -> &str {
    s.trim()
        .trim_start_matches(['\'', '"', '`', '('])
        .trim_end_matches(['\'', '"', '`', ')', ',', ';', ':', '.', '!', '?'])
        .trim()
}

/// Highest confidence wins; the first of equals wins.
fn select(candidates: Vec<ActionEvent>) -> Option<ActionEvent> {
    let mut best: Option<ActionEvent> = None;
    for candidate in candidates {
        match &best {
            Some(b) if candidate.confidence <= b.confidence => {}
            _ => best = Some(candidate),
        }
    }
    best
}
