//! Auto-sync for CLI commands.
//!
//! When `auto_sync` is enabled, read commands pull first and write commands
//! push afterwards. Failures never fail the command: the local store stays
//! authoritative and the changes remain for the next `lists sync`.

use listsync_core::{FileStore, Store};

use super::build_engine;
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoSync {
    BeforeRead,
    AfterWrite,
}

/// Performs auto-sync if enabled.
pub fn try_auto_sync(config: &Config, when: AutoSync) {
    if !config.sync.auto_sync || !config.sync.is_configured() {
        return;
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(_) => return,
    };

    let engine = match build_engine(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Auto-sync: {}", e);
            return;
        }
    };

    tracing::debug!(?when, "auto-sync");
    rt.block_on(async {
        match when {
            AutoSync::BeforeRead => {
                engine.pull_and_store().await;
                // Ranks backfilled on load are pushed right away.
                engine.flush().await;
            }
            AutoSync::AfterWrite => {
                let store = FileStore::new(config.data_dir.value.clone());
                engine.push(store.load_records());
                if !engine.flush().await {
                    eprintln!("Auto-sync: changes kept locally, run 'lists sync' to retry");
                }
            }
        }

        if engine.status().auth_error {
            eprintln!("Auto-sync: authentication failed, check sync.token");
        }
        engine.shutdown();
    });
}
