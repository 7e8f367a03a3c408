//! agent-eye: turn status and transcripts for background coding agents
//!
//! Answers "is this worktree's agent still generating?" and "what has it said?"
//! from the session logs the agents write, either once from the command line or
//! for other processes over a Unix socket.

use agent_eye::config::{self, Config};
use agent_eye::sessions::{ServiceOptions, TurnService};
use agent_eye::{CoarseSessionStatus, server};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "agent-eye", about = "Turn status for background coding agents")]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Print the turn status of a worktree
    Poll {
        /// Repository root the worktree belongs to
        #[arg(long)]
        repo: PathBuf,
        /// Working directory the agent was launched in
        #[arg(long)]
        worktree: PathBuf,
        /// Last known session status, used until a log appears
        #[arg(long, value_enum, default_value = "none")]
        status: CoarseSessionStatus,
        /// Log tree to search (repeatable; defaults to the configured roots)
        #[arg(long = "root")]
        roots: Vec<PathBuf>,
        /// Keep polling every N seconds
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// Print the transcript of a session
    Transcript {
        session_id: String,
        /// Log tree to search (repeatable; defaults to the configured roots)
        #[arg(long = "root")]
        roots: Vec<PathBuf>,
    },
    /// Answer queries over a Unix socket
    Serve {
        /// Socket path (defaults to the configured path)
        #[arg(long)]
        socket: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("AGENT_EYE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("failed to encode output: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn roots_or_configured(roots: Vec<PathBuf>, config: &Config) -> Vec<PathBuf> {
    if roots.is_empty() {
        config.log_roots.clone()
    } else {
        roots
    }
}

async fn run(command: Command, config: Config) -> ExitCode {
    let service = Arc::new(TurnService::new(ServiceOptions::from(&config)));

    match command {
        Command::Poll {
            repo,
            worktree,
            status,
            roots,
            watch,
        } => {
            let roots = roots_or_configured(roots, &config);
            let Some(secs) = watch else {
                let info = service.poll_turn_info(&repo, &worktree, &roots, status).await;
                return print_json(&info);
            };

            let mut tick = tokio::time::interval(Duration::from_secs(secs.max(1)));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                let info = service.poll_turn_info(&repo, &worktree, &roots, status).await;
                match serde_json::to_string(&info) {
                    Ok(json) => println!("{json}"),
                    Err(e) => error!("failed to encode output: {}", e),
                }
            }
        }
        Command::Transcript { session_id, roots } => {
            let roots = roots_or_configured(roots, &config);
            match service.read_transcript(&roots, &session_id).await {
                Ok(Some(messages)) => print_json(&messages),
                Ok(None) => {
                    eprintln!("no session log found for {session_id}");
                    ExitCode::FAILURE
                }
                Err(e) => {
                    error!("failed to read transcript: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Command::Serve { socket } => {
            let path = socket.unwrap_or_else(|| config.socket_path());
            let roots = Arc::new(config.log_roots.clone());
            info!(roots = ?roots, "starting query server");
            match server::start(service, roots, &path).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!("query server failed: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Command::Config { init } => {
            if init {
                match config::save_config(&Config::default()) {
                    Ok(path) => eprintln!("wrote {}", path.display()),
                    Err(e) => {
                        error!("failed to write config: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            }
            print_json(&config)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = config::load_config();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to create tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run(cli.command, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["agent-eye"]).is_err());
    }

    #[test]
    fn cli_verbose_three() {
        let cli = Cli::try_parse_from(["agent-eye", "-vvv", "config"]).unwrap();
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn cli_poll_defaults() {
        let cli = Cli::try_parse_from([
            "agent-eye",
            "poll",
            "--repo",
            "/r",
            "--worktree",
            "/r/wt",
        ])
        .unwrap();
        match cli.command {
            Command::Poll {
                repo,
                worktree,
                status,
                roots,
                watch,
            } => {
                assert_eq!(repo, PathBuf::from("/r"));
                assert_eq!(worktree, PathBuf::from("/r/wt"));
                assert_eq!(status, CoarseSessionStatus::None);
                assert!(roots.is_empty());
                assert_eq!(watch, None);
            }
            _ => panic!("expected Poll command"),
        }
    }

    #[test]
    fn cli_poll_status_and_roots() {
        let cli = Cli::try_parse_from([
            "agent-eye",
            "poll",
            "--repo",
            "/r",
            "--worktree",
            "/r/wt",
            "--status",
            "created",
            "--root",
            "/a",
            "--root",
            "/b",
        ])
        .unwrap();
        match cli.command {
            Command::Poll { status, roots, .. } => {
                assert_eq!(status, CoarseSessionStatus::Created);
                assert_eq!(roots, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
            }
            _ => panic!("expected Poll command"),
        }
    }

    #[test]
    fn cli_transcript() {
        let cli = Cli::try_parse_from(["agent-eye", "transcript", "abc"]).unwrap();
        match cli.command {
            Command::Transcript { session_id, roots } => {
                assert_eq!(session_id, "abc");
                assert!(roots.is_empty());
            }
            _ => panic!("expected Transcript command"),
        }
    }

    #[test]
    fn explicit_roots_override_config() {
        let config = Config::default();
        assert_eq!(roots_or_configured(Vec::new(), &config), config.log_roots);
        assert_eq!(
            roots_or_configured(vec![PathBuf::from("/x")], &config),
            vec![PathBuf::from("/x")]
        );
    }
}
