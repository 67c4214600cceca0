use chrono::{DateTime, Utc};
use serde::Serialize;

/// Coarse state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncPhase {
    #[default]
    Idle,
    /// A push is waiting for its debounce timer.
    DebouncePending,
    /// A request round is in flight (or padding its minimum duration).
    Syncing,
    /// Authentication failed for good; only `reset_auth` leaves this state.
    AuthError,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Idle => write!(f, "idle"),
            SyncPhase::DebouncePending => write!(f, "debounce-pending"),
            SyncPhase::Syncing => write!(f, "syncing"),
            SyncPhase::AuthError => write!(f, "auth-error"),
        }
    }
}

/// Snapshot published to subscribers on every state change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub is_syncing: bool,
    pub has_pending_changes: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// `None` until authentication has been checked.
    pub is_authenticated: Option<bool>,
    pub auth_error: bool,
}
