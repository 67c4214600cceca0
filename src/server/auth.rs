//! Credentials for the two sync endpoints.
//!
//! The token endpoint takes `Authorization: Bearer <key>`; the web endpoint
//! takes a `session=<key>` cookie. Both map to a user from the key file:
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//! sessions:
//!   - key: "browser-session-key"
//!     user_id: "user1"
//! ```

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::routes::AppState;

/// Authenticated user info, added to request extensions after auth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

/// Key entry in the config file
#[derive(Debug, Clone, Deserialize)]
pub struct KeyEntry {
    pub key: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct KeyFile {
    #[serde(default)]
    api_keys: Vec<KeyEntry>,
    #[serde(default)]
    sessions: Vec<KeyEntry>,
}

/// Maps bearer keys and session keys to users
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
    sessions: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    pub fn new(api_keys: Vec<KeyEntry>, sessions: Vec<KeyEntry>) -> Self {
        fn index(entries: Vec<KeyEntry>) -> HashMap<String, AuthUser> {
            entries
                .into_iter()
                .map(|e| (e.key, AuthUser { user_id: e.user_id }))
                .collect()
        }

        Self {
            keys: index(api_keys),
            sessions: index(sessions),
        }
    }

    /// Load keys from the config file. A missing or broken file yields an
    /// empty store, so every authenticated request fails.
    pub fn load(config_path: &Path) -> Self {
        let contents = match std::fs::read_to_string(config_path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                tracing::warn!("No API keys loaded - all authenticated requests will fail");
                return Self::default();
            }
        };

        match serde_yaml::from_str::<KeyFile>(&contents) {
            Ok(file) => {
                let store = Self::new(file.api_keys, file.sessions);
                tracing::info!(
                    "Loaded {} API key(s) and {} session(s)",
                    store.keys.len(),
                    store.sessions.len()
                );
                store
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn validate_key(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }

    pub fn validate_session(&self, session: &str) -> Option<AuthUser> {
        self.sessions.get(session).cloned()
    }
}

/// Auth error response
#[derive(Serialize)]
struct AuthError {
    error: &'static str,
    message: &'static str,
}

fn unauthorized(error: &'static str, message: &'static str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(AuthError { error, message })).into_response()
}

/// Bearer authentication for the token endpoint
pub async fn bearer_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(key) => key,
            None => {
                return unauthorized(
                    "invalid_auth",
                    "Authorization header must use Bearer scheme",
                )
            }
        },
        None => return unauthorized("missing_auth", "Authorization header required"),
    };

    match state.api_keys.validate_key(api_key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => unauthorized("invalid_key", "Invalid API key"),
    }
}

/// Session cookie authentication for the web endpoint
pub async fn session_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(session) = session_cookie(request.headers()) else {
        return unauthorized("missing_session", "Session cookie required");
    };

    match state.api_keys.validate_session(&session) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => unauthorized("invalid_session", "Session expired or unknown"),
    }
}

/// Value of the `session` cookie, if any.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == listsync_core::transport::SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}
