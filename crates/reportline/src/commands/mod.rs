//! CLI command handlers.

pub mod login;
pub mod logout;
pub mod status;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use console::Style;
use reportline_client::ApiClient;
use reportline_config::ReportlineConfig;
use reportline_session::{ExpiryOracle, FileStore, Navigator, SessionSupervisor};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Effective configuration.
    pub config: ReportlineConfig,
    /// Session file location.
    pub session_path: PathBuf,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Open the session store.
    pub fn store(&self) -> Arc<FileStore> {
        Arc::new(FileStore::with_path(self.session_path.clone()))
    }

    /// Build the backend client.
    pub fn client(&self) -> Result<ApiClient> {
        Ok(self.config.client_builder().build()?)
    }

    /// Build a supervisor over the session file and the backend.
    pub fn supervisor(&self) -> Result<SessionSupervisor> {
        let client = Arc::new(self.client()?);
        Ok(SessionSupervisor::new(
            self.store(),
            client.clone(),
            client,
            ExpiryOracle::system(),
            self.config.supervisor_config(),
        ))
    }
}

/// "Navigates" to login by telling the user how to sign in again.
pub struct TerminalNavigator {
    pub json_output: bool,
}

impl Navigator for TerminalNavigator {
    fn to_login(&self) {
        if !self.json_output {
            let dim = Style::new().dim();
            println!("  {}", dim.apply_to("Sign in again with: reportline login"));
            println!();
        }
    }
}
