//! Login command - exchanges credentials for a session token.

use std::io::Write;

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use reportline_client::LoginRequest;
use reportline_session::CredentialStore;
use serde::Serialize;

use super::Context;

/// Arguments for the login command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account email (prompted when omitted)
    #[arg(short, long)]
    pub email: Option<String>,

    /// Replace an existing valid session
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct LoginOutput {
    subject_id: Option<String>,
    role: Option<String>,
    expires_at: String,
}

/// Run the login command.
pub async fn run(args: LoginArgs, ctx: &Context) -> Result<()> {
    let supervisor = ctx.supervisor()?;

    if !args.force
        && let Some(token) = ctx.store().token()
        && !supervisor.suppress_alerts()
    {
        let remaining = reportline_session::ExpiryOracle::system().format_remaining(&token);
        println!("Already signed in (expires in {}).", remaining);
        println!("Run 'reportline logout' first, or pass --force.");
        return Ok(());
    }

    let email = match args.email {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    if email.is_empty() {
        bail!("Email is required");
    }
    let password = rpassword::prompt_password("Password: ")?;

    let client = ctx.client()?;
    let response = client
        .auth()
        .login(&LoginRequest {
            email: email.clone(),
            password,
        })
        .await?;

    let claims = supervisor.begin_session(&response.token, response.name.as_deref())?;
    tracing::info!(email = %email, "Signed in");

    if ctx.json_output {
        let output = LoginOutput {
            subject_id: claims.subject_id,
            role: claims.role,
            expires_at: claims.expires_at.to_rfc3339(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let green = Style::new().green();
        let dim = Style::new().dim();

        println!();
        println!("{}", style("Signed in").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        if let Some(name) = &response.name {
            println!("  {} {}", dim.apply_to("Name:"), name);
        }
        if let Some(role) = &claims.role {
            println!("  {} {}", dim.apply_to("Role:"), role);
        }
        println!(
            "  {} {}",
            dim.apply_to("Expires:"),
            green.apply_to(claims.expires_at.format("%Y-%m-%d %H:%M:%S UTC"))
        );
        println!();
    }

    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
