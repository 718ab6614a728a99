//! Logout command - tears the stored session down.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::{Context, TerminalNavigator};

/// Arguments for the logout command.
#[derive(Args, Debug)]
pub struct LogoutArgs {}

/// Run the logout command.
pub async fn run(_args: LogoutArgs, ctx: &Context) -> Result<()> {
    let supervisor = ctx.supervisor()?;

    if !ctx.json_output {
        println!();
        println!("{}", style("Signing out").bold());
    }

    let navigator = TerminalNavigator {
        json_output: ctx.json_output,
    };
    let outcome = supervisor.logout(&navigator).await;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if !outcome.files_cleaned() {
        let yellow = Style::new().yellow();
        println!(
            "  {}",
            yellow.apply_to("Server files could not be removed; local session cleared anyway.")
        );
    }

    Ok(())
}
