//! Server-side modules for the listsync server.

pub mod auth;
pub mod config;
pub mod routes;
pub mod storage;

pub use auth::{ApiKeyStore, AuthUser};
pub use config::ServerConfig;
pub use routes::{app, AppState};
pub use storage::{ServerStorage, ServerStorageError};
