//! Status command - shows the stored session and, optionally, account status.

use std::sync::OnceLock;

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use reportline_session::{
    CheckFailure, CredentialStore, ExpiryOracle, LivenessListener, SessionField, decode_claims,
};
use serde::Serialize;

use super::Context;

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Also ask the backend whether the account is still active
    #[arg(short, long)]
    pub check: bool,
}

/// Status response for JSON output.
#[derive(Debug, Default, Serialize)]
struct StatusOutput {
    signed_in: bool,
    expired: bool,
    remaining: Option<String>,
    expires_at: Option<String>,
    role: Option<String>,
    display_name: Option<String>,
    account_active: Option<bool>,
    check_error: Option<String>,
}

/// Records the outcome of an express check.
#[derive(Default)]
struct CheckRecorder {
    failure: OnceLock<CheckFailure>,
}

impl LivenessListener for CheckRecorder {
    fn on_inactive(&self) {}

    fn on_error(&self, failure: CheckFailure) {
        let _ = self.failure.set(failure);
    }
}

/// Run the status command.
pub async fn run(args: StatusArgs, ctx: &Context) -> Result<()> {
    let store = ctx.store();
    let oracle = ExpiryOracle::system();
    let field = |f: SessionField| store.get(f).ok().flatten();

    let mut output = StatusOutput::default();
    if let Some(token) = store.token() {
        output.signed_in = true;
        output.expired = oracle.is_expired(&token);
        output.remaining = Some(oracle.format_remaining(&token));
        output.expires_at = decode_claims(&token)
            .ok()
            .map(|c| c.expires_at.to_rfc3339());
        output.role = field(SessionField::Role);
        output.display_name = field(SessionField::DisplayName);

        if args.check && !output.expired {
            let supervisor = ctx.supervisor()?;
            let recorder = CheckRecorder::default();
            output.account_active = supervisor.scheduler().express_check(&recorder).await;
            output.check_error = recorder.failure.get().map(|f| f.to_string());
        }
    }

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let green = Style::new().green();
    let red = Style::new().red();
    let yellow = Style::new().yellow();
    let dim = Style::new().dim();

    println!();
    println!("{}", style("Reportline Session").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();

    if !output.signed_in {
        println!("  {} {}", dim.apply_to("Status:"), red.apply_to("● signed out"));
        println!();
        println!("  {}", dim.apply_to("Sign in with: reportline login"));
        println!();
        return Ok(());
    }

    if output.expired {
        println!("  {} {}", dim.apply_to("Status:"), red.apply_to("● expired"));
    } else {
        println!("  {} {}", dim.apply_to("Status:"), green.apply_to("● signed in"));
    }
    if let Some(name) = &output.display_name {
        println!("  {} {}", dim.apply_to("Name:"), name);
    }
    if let Some(role) = &output.role {
        println!("  {} {}", dim.apply_to("Role:"), role);
    }
    if let Some(remaining) = &output.remaining {
        println!("  {} {}", dim.apply_to("Remaining:"), remaining);
    }
    if ctx.verbose {
        println!("  {} {}", dim.apply_to("Session file:"), ctx.session_path.display());
    }

    if args.check {
        let account = match (output.account_active, &output.check_error) {
            (Some(true), _) => green.apply_to("active".to_string()),
            (Some(false), _) => red.apply_to("deactivated".to_string()),
            (None, Some(error)) => yellow.apply_to(format!("unknown ({})", error)),
            (None, None) => yellow.apply_to("unknown".to_string()),
        };
        println!("  {} {}", dim.apply_to("Account:"), account);
    }

    println!();
    Ok(())
}
