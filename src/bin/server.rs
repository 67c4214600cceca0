//! listsync Sync Server
//!
//! Stores each user's lists and merges pushes from every device with
//! last-write-wins per record.
//!
//! # Configuration
//!
//! Environment variables:
//! - `LISTSYNC_PORT`: Port to listen on (default: 8080)
//! - `LISTSYNC_DATA_DIR`: Directory to store collections (default: ~/.local/share/listsync-server)
//! - `LISTSYNC_CONFIG`: Path to config file (default: ~/.config/listsync-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//! sessions:
//!   - key: "browser-session-key"
//!     user_id: "user1"
//! ```

use listsync::{app, ApiKeyStore, AppState, ServerConfig, ServerStorage};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "listsync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        tracing::error!("Failed to create data directory: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Config file: {}", config.config_path.display());

    let state = AppState::new(
        ApiKeyStore::load(&config.config_path),
        ServerStorage::new(config.data_dir),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app(state)).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
