//! `wait-approval` - run and inspect wait-approval stages from the shell.
//!
//! ## Commands
//!
//! - `validate`: check a stage config
//! - `describe`: print the stage descriptor the planner would see
//! - `approve`: record an approval for a file-backed stage
//! - `run`: execute a file-backed stage until quorum or Ctrl-C

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stage_client::{FileStageClient, StageCommand};
use tracing::{info, Level};
use wait_approval::{
    build_definition, execute, stop_signal, ExecutorConfig, StageOptions, StageStatus,
    DEFAULT_POLL_INTERVAL,
};

#[derive(Parser)]
#[command(name = "wait-approval")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Wait-approval pipeline stage host", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a stage config (JSON)
    Validate {
        /// Path to the stage config
        config: PathBuf,
    },

    /// Print the stage descriptor for a config as JSON
    Describe {
        /// Path to the stage config
        config: PathBuf,
    },

    /// Record an approval for a file-backed stage
    Approve {
        /// Path to the stage state file
        state: PathBuf,

        /// Approving user
        #[arg(short, long)]
        user: String,

        /// Stage instance identifier
        #[arg(long, default_value = "wait-approval")]
        stage_id: String,
    },

    /// Execute a file-backed stage until quorum (exit 0) or Ctrl-C (exit 1)
    Run {
        /// Path to the stage config
        config: PathBuf,

        /// Path to the stage state file (created if missing)
        state: PathBuf,

        /// Stage instance identifier
        #[arg(long, default_value = "wait-approval")]
        stage_id: String,

        /// Seconds between two approval checks
        #[arg(
            long,
            default_value_t = DEFAULT_POLL_INTERVAL.as_secs(),
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        poll_interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    wait_approval::init_tracing(cli.json, level);

    match cli.command {
        Commands::Validate { config } => cmd_validate(&config),
        Commands::Describe { config } => cmd_describe(&config),
        Commands::Approve {
            state,
            user,
            stage_id,
        } => cmd_approve(&state, &user, &stage_id).await,
        Commands::Run {
            config,
            state,
            stage_id,
            poll_interval_secs,
        } => {
            cmd_run(
                &config,
                &state,
                &stage_id,
                Duration::from_secs(poll_interval_secs),
            )
            .await
        }
    }
}

fn read_config(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read config {:?}", path))
}

fn cmd_validate(config: &Path) -> Result<ExitCode> {
    let raw = read_config(config)?;
    match StageOptions::decode(&raw) {
        Ok(options) => {
            println!(
                "OK: {} approver(s), {} required",
                options.approvers().len(),
                options.min_approver_num()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("Invalid: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn cmd_describe(config: &Path) -> Result<ExitCode> {
    let raw = read_config(config)?;
    let descriptor = build_definition(&raw).context("Invalid stage config")?;
    println!("{}", serde_json::to_string_pretty(&descriptor)?);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_approve(state: &Path, user: &str, stage_id: &str) -> Result<ExitCode> {
    let client = FileStageClient::new(stage_id, state);
    let command = StageCommand::approve(stage_id, user);
    let command_id = command.id.clone();
    client
        .enqueue_command(command)
        .await
        .with_context(|| format!("Failed to record approval in {:?}", state))?;

    info!(stage_id = %stage_id, command_id = %command_id, user = %user, "approval recorded");
    println!("Recorded approval from {user} ({command_id})");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_run(
    config: &Path,
    state: &Path,
    stage_id: &str,
    poll_interval: Duration,
) -> Result<ExitCode> {
    let raw = read_config(config)?;
    let client = Arc::new(FileStageClient::new(stage_id, state));
    let (handle, signal) = stop_signal();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling stage");
            handle.cancel();
        }
    });

    let status = execute(
        client,
        &raw,
        ExecutorConfig::with_poll_interval(poll_interval),
        signal,
    )
    .await;

    info!(stage_id = %stage_id, status = ?status, "stage finished");
    println!("{}", serde_json::to_string(&status)?);
    Ok(exit_code(status))
}

fn exit_code(status: StageStatus) -> ExitCode {
    match status {
        StageStatus::Success => ExitCode::SUCCESS,
        StageStatus::Running | StageStatus::Failure => ExitCode::FAILURE,
    }
}
