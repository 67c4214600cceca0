//! Wiring between the CLI configuration and the sync engine.

mod auto_sync;

use std::sync::Arc;

use listsync_core::{
    BearerCredentials, EngineSettings, FileStore, HttpTransport, StaticBridge, SyncEngine,
    TransportError,
};

use crate::config::{Config, SyncConfig};

pub use auto_sync::{try_auto_sync, AutoSync};

/// Builds an engine over the local store for the configured server.
pub fn build_engine(config: &Config) -> Result<SyncEngine, SyncSetupError> {
    let sync = &config.sync;
    let server_url = sync
        .server_url
        .as_deref()
        .ok_or(SyncSetupError::NotConfigured)?;
    if !sync.is_configured() {
        return Err(SyncSetupError::NotConfigured);
    }

    let transport = match &sync.session {
        Some(session) if sync.token.is_none() => HttpTransport::with_session(server_url, session)?,
        _ => HttpTransport::new()?,
    };
    tracing::debug!(server_url, mode = sync.auth_mode(), "building sync engine");
    let credentials = sync
        .token
        .as_ref()
        .map(|token| BearerCredentials::new(token.clone(), server_url));

    Ok(SyncEngine::new(
        EngineSettings::new(server_url),
        Arc::new(FileStore::new(config.data_dir.value.clone())),
        Arc::new(transport),
        Arc::new(StaticBridge::new(credentials)),
    ))
}

/// Prints how to configure sync.
pub fn print_setup_hint() {
    println!("To enable sync, add to your config file:");
    println!();
    println!("  sync:");
    println!("    server_url: \"http://localhost:8080\"");
    println!("    token: \"<api key>\"");
    println!();
    println!("Or set environment variables:");
    println!("  LISTS_SYNC_URL, LISTS_SYNC_TOKEN (or LISTS_SYNC_SESSION)");
}

pub fn describe(sync: &SyncConfig) -> String {
    match &sync.server_url {
        Some(url) => format!("{} ({})", url, sync.auth_mode()),
        None => "not configured".to_string(),
    }
}

/// Errors setting up sync
#[derive(Debug)]
pub enum SyncSetupError {
    NotConfigured,
    Transport(TransportError),
}

impl std::fmt::Display for SyncSetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncSetupError::NotConfigured => {
                write!(f, "Sync not configured. Add server_url and token to config.")
            }
            SyncSetupError::Transport(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SyncSetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncSetupError::NotConfigured => None,
            SyncSetupError::Transport(e) => Some(e),
        }
    }
}

impl From<TransportError> for SyncSetupError {
    fn from(e: TransportError) -> Self {
        SyncSetupError::Transport(e)
    }
}
