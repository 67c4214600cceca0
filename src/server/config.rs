//! Server configuration from the environment.
//!
//! Environment variables:
//! - `LISTSYNC_PORT`: Port to listen on (default: 8080)
//! - `LISTSYNC_DATA_DIR`: Directory holding each user's lists (default: ~/.local/share/listsync-server)
//! - `LISTSYNC_CONFIG`: Path to the key file (default: ~/.config/listsync-server/config.yaml)

use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Directory holding per-user collections
    pub data_dir: PathBuf,
    /// Path to the YAML file with API keys and sessions
    pub config_path: PathBuf,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let port = std::env::var("LISTSYNC_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let data_dir = std::env::var("LISTSYNC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("listsync-server")
            });

        let config_path = std::env::var("LISTSYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("listsync-server")
                    .join("config.yaml")
            });

        Self {
            port,
            data_dir,
            config_path,
        }
    }
}
