//! Reference sync server for ranked lists.
//!
//! Serves the two sync endpoints the clients talk to and applies
//! last-write-wins per record on every push, so the copy it echoes back is
//! authoritative.

pub mod server;

pub use server::{
    app, ApiKeyStore, AppState, AuthUser, ServerConfig, ServerStorage, ServerStorageError,
};
