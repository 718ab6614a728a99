//! Watch command - supervises the stored session in the foreground.

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use reportline_session::{CheckFailure, SessionEvent, SessionSupervisor};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;

use super::{Context, TerminalNavigator};

/// Arguments for the watch command.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Tear the session down when interrupted
    #[arg(long)]
    pub teardown_on_exit: bool,
}

/// Run the watch command.
pub async fn run(args: WatchArgs, ctx: &Context) -> Result<()> {
    let supervisor = ctx.supervisor()?;
    if supervisor.suppress_alerts() {
        bail!("No valid session. Sign in with: reportline login");
    }

    let mut events = supervisor.subscribe();
    supervisor.start();

    if !ctx.json_output {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Watching session").bold());
        println!("  {}", dim.apply_to("Press Ctrl+C to stop"));
        println!();
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if handle_event(&supervisor, event, ctx).await {
                        return Ok(());
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "Missed session events");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                supervisor.stop();
                if args.teardown_on_exit {
                    let outcome = supervisor.on_unload().await;
                    tracing::info!(files_cleaned = outcome.files_cleaned(), "Session torn down on exit");
                }
                return Ok(());
            }
        }
    }
}

/// Print one event. Returns `true` once the session is over.
async fn handle_event(supervisor: &SessionSupervisor, event: SessionEvent, ctx: &Context) -> bool {
    let red = Style::new().red();
    let yellow = Style::new().yellow();

    match event {
        SessionEvent::TokenExpired | SessionEvent::AccountDeactivated => {
            let (kind, message) = if event == SessionEvent::TokenExpired {
                ("token_expired", "Your session has expired.")
            } else {
                ("account_deactivated", "Your account has been deactivated.")
            };
            if ctx.json_output {
                println!("{}", json!({ "event": kind }));
            } else {
                println!("  {} {}", red.apply_to("●"), style(message).bold());
                println!("  Cleaning up...");
            }
            false
        }
        SessionEvent::LivenessFailed { kind } => {
            if supervisor.suppress_alerts() {
                return false;
            }
            if ctx.json_output {
                println!("{}", json!({ "event": "liveness_failed", "kind": kind.as_str() }));
            } else {
                println!("  {} {}", yellow.apply_to("!"), liveness_failed_message(kind));
            }
            false
        }
        SessionEvent::CleanupFinished { outcome } => {
            if ctx.json_output {
                println!("{}", json!({ "event": "cleanup_finished", "outcome": outcome }));
            }
            let navigator = TerminalNavigator {
                json_output: ctx.json_output,
            };
            supervisor.acknowledge(&navigator).await
        }
    }
}

/// Status checks stop after a failure; only a manual check resumes them.
fn liveness_failed_message(kind: CheckFailure) -> String {
    format!(
        "Could not verify account status ({kind}); status checks paused. \
         Run `reportline status --check` to check again."
    )
}
