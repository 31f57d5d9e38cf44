use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use warden_conductor::config::SessionConfig;
use warden_conductor::queue::{load_queue, Queue};
use warden_conductor::runner::notify::LogNotifier;
use warden_conductor::runner::{compose_prompt, ordered_tasks};
use warden_conductor::{ControlCommand, ObserverHub, SessionControl, SessionOutcome, SessionRunner};
use warden_core::SessionMode;

use crate::load_config;

pub struct RunParams<'a> {
    pub queue_file: &'a Path,
    pub config_file: Option<&'a Path>,
    pub mode: Option<SessionMode>,
    pub cwd: Option<&'a Path>,
    pub agent: Option<&'a Path>,
    pub json_events: bool,
    pub dry_run: bool,
}

/// Execute `warden run <queue.yaml>`
pub fn execute(params: RunParams<'_>) -> Result<()> {
    let queue = load_queue(params.queue_file)?;
    let mut config = load_config(params.config_file)?;
    if let Some(mode) = params.mode {
        config.mode = mode;
    }
    if let Some(agent) = params.agent {
        config.agent.bin = agent.to_path_buf();
    }
    let cwd = resolve_cwd(params.cwd)?;

    if params.dry_run {
        print_plan(&queue, &config, &cwd);
        return Ok(());
    }
    if queue.tasks.is_empty() {
        println!("Queue \"{}\" has no tasks.", queue.name);
        return Ok(());
    }

    let launcher = config.agent.launcher();
    let notifier = LogNotifier;
    let hub = Arc::new(ObserverHub::default());
    let cancel = CancellationToken::new();

    // Handle Ctrl+C gracefully
    ctrlc_cancel(cancel.clone());

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        let (tx, rx) = mpsc::channel(16);
        let listener = SessionControl::new(hub.clone()).listen(rx);
        forward_stdin(tx);

        let report = SessionRunner::new(&config, &launcher, &notifier, hub.clone(), &cwd)
            .with_json_events(params.json_events)
            .run(&queue, cancel)
            .await;
        listener.abort();
        report
    })?;

    println!("Events: {}", report.events_path.display());
    match &report.outcome {
        SessionOutcome::Completed if report.stats.tasks_failed == 0 => Ok(()),
        SessionOutcome::Completed => bail!("{} task(s) failed", report.stats.tasks_failed),
        SessionOutcome::Stopped { reason } => {
            bail!("session stopped: {reason} ({} pending)", report.pending())
        }
        SessionOutcome::Cancelled => bail!("session cancelled ({} pending)", report.pending()),
    }
}

fn resolve_cwd(cwd: Option<&Path>) -> Result<PathBuf> {
    let current = std::env::current_dir().context("reading current directory")?;
    Ok(match cwd {
        Some(p) if p.is_relative() => current.join(p),
        Some(p) => p.to_path_buf(),
        None => current,
    })
}

fn print_plan(queue: &Queue, config: &SessionConfig, cwd: &Path) {
    println!("\n[dry-run] Queue: {}", queue.name);
    println!("  Tasks: {}", queue.tasks.len());
    println!("  Mode: {}", config.mode.as_str());
    println!(
        "  Agent: {} {}",
        config.agent.bin.display(),
        config.agent.args.join(" ")
    );
    println!("  Timeout: {}s per task", config.agent.timeout_sec);
    println!("  Stop after: {} errors", config.rules.stop_on.error_count);
    println!("  Cwd: {}", cwd.display());
    println!("\n  Run order:");
    for (i, task) in ordered_tasks(&queue.tasks).iter().enumerate() {
        let prompt = compose_prompt(&config.context, &queue.context, task);
        println!(
            "  {}. {} [{:?}] ({} chars)",
            i + 1,
            task.id,
            task.priority,
            prompt.chars().count()
        );
        if !task.description.is_empty() {
            println!("     {}", task.description);
        }
    }
}

/// Read control commands from stdin on a plain thread and feed them to the
/// session. Stops when stdin closes or the session stops listening.
fn forward_stdin(tx: mpsc::Sender<ControlCommand>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<ControlCommand>() {
                Ok(command) => {
                    if tx.blocking_send(command).is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("  {e}"),
            }
        }
    });
}

fn ctrlc_cancel(cancel: CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        cancel.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_cwd_is_anchored() {
        let resolved = resolve_cwd(Some(Path::new("sub"))).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("sub"));
    }

    #[test]
    fn dry_run_launches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let queue = dir.path().join("q.yaml");
        std::fs::write(&queue, "tasks:\n  - id: a\n    prompt: do it\n").unwrap();
        let config = dir.path().join("c.yaml");
        std::fs::write(&config, "agent:\n  bin: /nonexistent/agent\n").unwrap();

        execute(RunParams {
            queue_file: &queue,
            config_file: Some(&config),
            mode: None,
            cwd: Some(dir.path()),
            agent: None,
            json_events: false,
            dry_run: true,
        })
        .unwrap();
        assert!(!dir.path().join(".warden").exists());
    }
}
