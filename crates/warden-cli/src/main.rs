mod cmd_classify;
mod cmd_run;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use warden_conductor::SessionConfig;
use warden_core::SessionMode;

/// Config picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG: &str = "warden.yaml";

#[derive(Parser)]
#[command(name = "warden", version, about = "Supervise coding agents through a task queue")]
struct Cli {
    /// Log at info level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every task in a queue file
    Run {
        /// Path to queue.yaml
        queue_file: PathBuf,
        /// Session config (default: ./warden.yaml if present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the configured mode: autonomous or assisted
        #[arg(long)]
        mode: Option<SessionMode>,
        /// Working directory for the agent
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Override the agent binary
        #[arg(long)]
        agent: Option<PathBuf>,
        /// Mirror session events to stdout as JSON lines
        #[arg(long)]
        json_events: bool,
        /// Show run order and prompts without launching anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Classify a line of agent output and show the resulting decision
    Classify {
        /// Text to classify
        text: String,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        mode: Option<SessionMode>,
    },
    /// Print the effective rule configuration as YAML
    Rules {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.cmd {
        Command::Run {
            queue_file,
            config,
            mode,
            cwd,
            agent,
            json_events,
            dry_run,
        } => cmd_run::execute(cmd_run::RunParams {
            queue_file: &queue_file,
            config_file: config.as_deref(),
            mode,
            cwd: cwd.as_deref(),
            agent: agent.as_deref(),
            json_events,
            dry_run,
        }),
        Command::Classify { text, config, mode } => {
            cmd_classify::execute(&text, config.as_deref(), mode)
        }
        Command::Rules { config } => cmd_classify::rules(config.as_deref()),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Explicit path, else `./warden.yaml` if it exists, else defaults.
pub(crate) fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    match path {
        Some(p) => SessionConfig::load(p),
        None => {
            let fallback = Path::new(DEFAULT_CONFIG);
            if fallback.is_file() {
                SessionConfig::load(fallback)
            } else {
                Ok(SessionConfig::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "warden",
            "run",
            "queue.yaml",
            "--mode",
            "assisted",
            "--json-events",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.cmd {
            Command::Run {
                queue_file,
                mode,
                json_events,
                dry_run,
                ..
            } => {
                assert_eq!(queue_file, PathBuf::from("queue.yaml"));
                assert_eq!(mode, Some(SessionMode::Assisted));
                assert!(json_events);
                assert!(!dry_run);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["warden", "classify", "x", "--mode", "yolo"]).is_err());
    }

    #[test]
    fn explicit_config_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.yaml");
        std::fs::write(&path, "mode: assisted\n").unwrap();
        assert_eq!(load_config(Some(&path)).unwrap().mode, SessionMode::Assisted);
    }
}
