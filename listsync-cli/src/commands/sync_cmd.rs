//! Sync CLI commands for synchronizing with the server.

use clap::{Args, Subcommand};

use crate::config::Config;
use crate::sync::{build_engine, describe, print_setup_hint, SyncSetupError};

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Pull the server's lists and merge them without pushing
    Pull,
    /// Show sync configuration and whether the server accepts our credentials
    Status,
}

impl SyncCommand {
    pub fn run(&self, config: &Config) -> Result<(), SyncCommandError> {
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| SyncCommandError::RuntimeError(e.to_string()))?;

        match &self.command {
            None => rt.block_on(self.sync(config)),
            Some(SyncSubcommand::Pull) => rt.block_on(self.pull(config)),
            Some(SyncSubcommand::Status) => rt.block_on(self.status(config)),
        }
    }

    async fn sync(&self, config: &Config) -> Result<(), SyncCommandError> {
        let engine = build_engine(config)?;

        println!("Syncing with {}...", describe(&config.sync));
        let result = engine.force_sync().await;
        let status = engine.status();
        engine.shutdown();

        match result {
            Some(records) => {
                println!(
                    "✓ {} item{} in sync",
                    records.len(),
                    if records.len() == 1 { "" } else { "s" }
                );
                Ok(())
            }
            None if status.auth_error || status.is_authenticated == Some(false) => {
                Err(SyncCommandError::Unauthorized)
            }
            None => Err(SyncCommandError::Failed),
        }
    }

    async fn pull(&self, config: &Config) -> Result<(), SyncCommandError> {
        let engine = build_engine(config)?;

        let records = engine.pull_and_store().await;
        // Ranks backfilled while loading go straight back up.
        engine.flush().await;
        let status = engine.status();
        engine.shutdown();

        if status.auth_error {
            return Err(SyncCommandError::Unauthorized);
        }
        println!(
            "✓ {} item{} after pull",
            records.len(),
            if records.len() == 1 { "" } else { "s" }
        );
        Ok(())
    }

    async fn status(&self, config: &Config) -> Result<(), SyncCommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        if !config.sync.is_configured() {
            println!("Status: Not configured");
            println!();
            print_setup_hint();
            return Ok(());
        }

        let engine = build_engine(config)?;
        let endpoint = engine.endpoint();

        println!("Server:    {}", describe(&config.sync));
        println!("Endpoint:  {}", endpoint.url);
        println!(
            "Auto-sync: {}",
            if config.sync.auto_sync {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!();

        print!("Server status: ");
        if engine.check_auth().await {
            println!("✓ authenticated");
        } else {
            match engine.status().is_authenticated {
                Some(false) => println!("✗ credentials rejected"),
                _ => println!("✗ unreachable"),
            }
        }
        engine.shutdown();

        Ok(())
    }
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    Setup(SyncSetupError),
    RuntimeError(String),
    Unauthorized,
    Failed,
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::Setup(e) => write!(f, "{}", e),
            SyncCommandError::RuntimeError(e) => write!(f, "Runtime error: {}", e),
            SyncCommandError::Unauthorized => {
                write!(f, "Server rejected the credentials; check sync.token or sync.session")
            }
            SyncCommandError::Failed => {
                write!(f, "Sync failed; local changes are kept for the next attempt")
            }
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::Setup(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SyncSetupError> for SyncCommandError {
    fn from(e: SyncSetupError) -> Self {
        SyncCommandError::Setup(e)
    }
}
