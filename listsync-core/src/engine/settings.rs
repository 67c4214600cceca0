use std::time::Duration;

use crate::merge::TOMBSTONE_RETENTION;

/// Sync path used with a bearer token.
pub const BEARER_SYNC_PATH: &str = "/api/v1/builder/sync";
/// Sync path used with ambient session cookies.
pub const COOKIE_SYNC_PATH: &str = "/api/builder/sync";

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MIN_BUSY: Duration = Duration::from_millis(600);
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Timing and addressing for a [`SyncEngine`](super::SyncEngine).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Origin used in cookie mode. Bearer mode takes the origin from the
    /// host's credentials instead.
    pub base_url: String,
    /// Quiet period after the last push before changes are sent.
    pub debounce: Duration,
    /// Period of the retry timer that re-sends pending changes.
    pub retry_interval: Duration,
    /// Minimum time a round stays visible as syncing.
    pub min_busy: Duration,
    /// How long to wait for the host to refresh a token.
    pub refresh_timeout: Duration,
    /// Age after which tombstones may be collected.
    pub tombstone_retention: Duration,
}

impl EngineSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            debounce: DEFAULT_DEBOUNCE,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            min_busy: DEFAULT_MIN_BUSY,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            tombstone_retention: TOMBSTONE_RETENTION,
        }
    }
}

/// Resolves the sync URL for a given origin and path.
pub(crate) fn join_url(origin: &str, path: &str) -> String {
    format!("{}{}", origin.trim_end_matches('/'), path)
}
