use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use deskpilot_lib::agent_engine::state::RunEvent;
use deskpilot_lib::config::{self, AppConfig};
use deskpilot_lib::errors::DeskPilotResult;
use deskpilot_lib::OperatorHandle;

/// DeskPilot - drive the desktop with a remote computer-use model
#[derive(Parser, Debug)]
#[command(
    name = "deskpilot",
    about = "Run one perception-action loop against the primary display",
    after_help = "ENVIRONMENT VARIABLES:\n\
        DESKPILOT_API_KEY    API key for the decision service (falls back to ANTHROPIC_API_KEY)\n\
        RUST_LOG             Log filter (default: info)"
)]
struct Args {
    /// Path to config.toml (default: next to the executable, then the working directory)
    #[arg(short, long, env = "DESKPILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Mark the run as human-supervised; actions listed in safety.require_approval_for
    /// are confirmed on stdin before they execute
    #[arg(long, short = 's')]
    supervised: bool,

    /// Save a full-resolution screenshot when the run starts
    #[arg(long)]
    archive: bool,

    /// What the model should accomplish
    #[arg(required = true, num_args = 1..)]
    instructions: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    deskpilot_lib::init_tracing();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "deskpilot failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> DeskPilotResult<ExitCode> {
    let mut config = load(args.config.as_deref());
    if args.archive {
        config.capture.archive_on_start = true;
    }

    let (handle, task) = deskpilot_lib::spawn(&config)?;
    tokio::spawn(report_events(handle.clone(), handle.subscribe()));

    let instructions = args.instructions.join(" ");
    handle.start(&instructions, args.supervised).await?;

    let settled = tokio::select! {
        state = handle.wait_until_settled() => state?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupt received, stopping run");
            handle.stop().await?;
            handle.wait_until_settled().await?
        }
    };

    handle.shutdown().await?;
    let _ = task.await;

    tracing::info!(
        phase = ?settled.phase,
        turns = settled.history.len(),
        error = ?settled.error,
        "run settled"
    );
    Ok(ExitCode::from(settled.phase.exit_code() as u8))
}

fn load(path: Option<&std::path::Path>) -> AppConfig {
    let loaded = match path {
        Some(p) => config::load_config_from(p),
        None => config::load_config(),
    };
    loaded.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "using default configuration");
        AppConfig::default()
    })
}

/// Logs controller events and answers approval prompts from stdin.
async fn report_events(handle: OperatorHandle, mut events: broadcast::Receiver<RunEvent>) {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "event stream lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            RunEvent::StateChanged { .. } | RunEvent::ScreenshotCaptured { .. } => {}
            RunEvent::Reasoning { turn, text } => println!("[{turn}] {text}"),
            RunEvent::ActionExecuted { turn, action, success, summary } => {
                println!("[{turn}] {} -> {} ({summary})", action.name(), if success { "ok" } else { "failed" });
            }
            RunEvent::CursorPosition { turn, x, y } => println!("[{turn}] cursor at {x},{y}"),
            RunEvent::CommandRejected { command, reason } => {
                tracing::warn!(command = %command, reason = %reason, "command rejected");
            }
            RunEvent::ApprovalRequired { turn, action } => {
                println!("[{turn}] approve {action:?}? [y/N]");
                let answer = stdin.next_line().await.ok().flatten().unwrap_or_default();
                let sent = if answer.trim().eq_ignore_ascii_case("y") {
                    handle.approve().await
                } else {
                    handle.reject().await
                };
                if let Err(e) = sent {
                    tracing::warn!(error = %e, "could not answer approval request");
                }
            }
        }
    }
}
