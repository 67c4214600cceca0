//! Hooks into the host application.
//!
//! The sync engine never owns credentials. It asks the host for the current
//! bearer token, asks it to refresh one after a 401, and tells it when
//! authentication has failed for good. A host that provides none of this
//! runs in cookie mode.

use std::sync::RwLock;

/// Bearer credentials supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerCredentials {
    pub token: String,
    /// Origin of the API, e.g. `https://lists.example.com`.
    pub base_url: String,
}

impl BearerCredentials {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: base_url.into(),
        }
    }
}

pub trait HostBridge: Send + Sync {
    /// Current bearer credentials, or `None` for cookie mode.
    fn credentials(&self) -> Option<BearerCredentials> {
        None
    }

    /// Asks the host to refresh the bearer token.
    ///
    /// Returns `true` if a refresh was dispatched; the host then reports the
    /// outcome through `SyncEngine::complete_token_refresh`. Returning `false`
    /// makes the refresh fail immediately.
    fn request_token_refresh(&self) -> bool {
        false
    }

    /// Called once when the engine enters the auth-error state.
    fn on_auth_failure(&self) {}
}

/// Bridge with no host behind it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBridge;

impl HostBridge for NoopBridge {}

/// Bridge holding fixed, replaceable bearer credentials.
///
/// It cannot refresh tokens; a 401 therefore ends in auth-error.
#[derive(Debug, Default)]
pub struct StaticBridge {
    credentials: RwLock<Option<BearerCredentials>>,
}

impl StaticBridge {
    pub fn new(credentials: Option<BearerCredentials>) -> Self {
        Self {
            credentials: RwLock::new(credentials),
        }
    }

    pub fn set_credentials(&self, credentials: Option<BearerCredentials>) {
        *self.credentials.write().unwrap_or_else(|e| e.into_inner()) = credentials;
    }
}

impl HostBridge for StaticBridge {
    fn credentials(&self) -> Option<BearerCredentials> {
        self.credentials
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
