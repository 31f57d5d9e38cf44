use std::path::Path;

use anyhow::{Context, Result};
use warden_core::{HistoryStats, PolicyRuling, SessionMode};
use warden_guard::{assess, decide, Classifier};

use crate::load_config;

/// Execute `warden classify <text>`
pub fn execute(text: &str, config_file: Option<&Path>, mode: Option<SessionMode>) -> Result<()> {
    let config = load_config(config_file)?;
    let mode = mode.unwrap_or(config.mode);
    let classifier = Classifier::new();

    let candidates = classifier.scan(text);
    if candidates.is_empty() {
        println!("No action detected.");
        return Ok(());
    }
    println!("Candidates:");
    for c in &candidates {
        println!("  {:<18} {:.2}  {}", c.action_type.as_str(), c.confidence, c.target);
    }

    let mut history = HistoryStats::new();
    let Some(action) = classifier.detect(text, &mut history) else {
        return Ok(());
    };
    let risk = assess(&action, &history);

    println!("\nAction: {} {}", action.action_type, action.target);
    if let Some(danger) = &action.danger {
        println!("  danger: {}", danger.reason);
    }
    println!("Risk:   {:.2} ({})", risk.score, risk.level.as_str());
    println!("  base {:.2}", risk.base);
    for f in &risk.factors {
        println!("  {:+.2} {}", f.contribution, f.name);
    }

    match decide(&action, &risk, &config.rules, mode) {
        PolicyRuling::Decide(d) => println!(
            "Decision ({}): {} ({})",
            mode.as_str(),
            d.outcome.as_str(),
            d.reason
        ),
        PolicyRuling::Stop { reason } => println!("Decision ({}): stop ({reason})", mode.as_str()),
    }
    Ok(())
}

/// Execute `warden rules`
pub fn rules(config_file: Option<&Path>) -> Result<()> {
    let config = load_config(config_file)?;
    let yaml = serde_yml::to_string(&config.rules).context("serializing rules")?;
    print!("{yaml}");
    Ok(())
}
