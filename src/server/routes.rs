//! HTTP routes.
//!
//! - `GET /health`: Health check (no auth required)
//! - `GET|POST /api/v1/builder/sync`: Sync with a bearer API key
//! - `GET|POST /api/builder/sync`: Sync with a `session` cookie
//!
//! GET returns the stored collection, tombstones included. POST merges the
//! pushed collection into it and returns the result.

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use listsync_core::engine::{BEARER_SYNC_PATH, COOKIE_SYNC_PATH};
use listsync_core::ListsPayload;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::auth::{bearer_auth, session_auth, ApiKeyStore, AuthUser};
use super::storage::{ServerStorage, ServerStorageError};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyStore>,
    pub storage: ServerStorage,
}

impl AppState {
    pub fn new(api_keys: ApiKeyStore, storage: ServerStorage) -> Self {
        Self {
            api_keys: Arc::new(api_keys),
            storage,
        }
    }
}

/// Builds the router with tracing.
pub fn app(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let bearer_routes = Router::new()
        .route(BEARER_SYNC_PATH, get(pull).post(push))
        .layer(middleware::from_fn_with_state(state.clone(), bearer_auth));

    let session_routes = Router::new()
        .route(COOKIE_SYNC_PATH, get(pull).post(push))
        .layer(middleware::from_fn_with_state(state.clone(), session_auth));

    Router::new()
        .merge(public_routes)
        .merge(bearer_routes)
        .merge(session_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn pull(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ListsPayload>, ApiError> {
    let lists = state.storage.load(&user.user_id)?;
    tracing::debug!(user_id = %user.user_id, count = lists.len(), "pull");
    Ok(Json(ListsPayload::new(lists)))
}

async fn push(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ListsPayload>,
) -> Result<Json<ListsPayload>, ApiError> {
    let merged = state.storage.apply(&user.user_id, &payload.lists)?;
    tracing::info!(
        user_id = %user.user_id,
        pushed = payload.lists.len(),
        stored = merged.len(),
        "push applied"
    );
    Ok(Json(ListsPayload::new(merged)))
}

/// Error body for failed sync requests
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Storage failure surfaced as a JSON error.
struct ApiError(ServerStorageError);

impl From<ServerStorageError> for ApiError {
    fn from(e: ServerStorageError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self.0 {
            ServerStorageError::InvalidUserId(_) => (StatusCode::BAD_REQUEST, "invalid_user"),
            ServerStorageError::IoError(_, _) | ServerStorageError::CorruptData(_, _) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
        };
        tracing::error!("{}", self.0);
        (
            status,
            Json(ErrorBody {
                error,
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::auth::KeyEntry;
    use axum::body::Body;
    use axum::http::{header, Request};
    use listsync_core::Record;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_app() -> (Router, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let keys = ApiKeyStore::new(
            vec![KeyEntry {
                key: "k1".to_string(),
                user_id: "alice".to_string(),
            }],
            vec![KeyEntry {
                key: "s1".to_string(),
                user_id: "alice".to_string(),
            }],
        );
        let state = AppState::new(keys, ServerStorage::new(temp_dir.path()));
        (app(state), temp_dir)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, auth: (header::HeaderName, &str), payload: &ListsPayload) -> Request<Body> {
        Request::post(uri)
            .header(auth.0, auth.1)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(payload).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let (app, _temp) = test_app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_bearer_endpoint_rejects_bad_keys() {
        let (app, _temp) = test_app();

        let missing = app
            .clone()
            .oneshot(Request::get(BEARER_SYNC_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app
            .oneshot(
                Request::get(BEARER_SYNC_PATH)
                    .header(header::AUTHORIZATION, "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(wrong).await["error"], "invalid_key");
    }

    #[tokio::test]
    async fn test_session_does_not_open_bearer_endpoint() {
        let (app, _temp) = test_app();
        let response = app
            .oneshot(
                Request::get(BEARER_SYNC_PATH)
                    .header(header::AUTHORIZATION, "Bearer s1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_push_then_pull_across_endpoints() {
        let (app, _temp) = test_app();
        let record = Record::list("Dwarfs").with_rank("i");
        let payload = ListsPayload::new(vec![record.clone()]);

        let pushed = app
            .clone()
            .oneshot(post(
                BEARER_SYNC_PATH,
                (header::AUTHORIZATION, "Bearer k1"),
                &payload,
            ))
            .await
            .unwrap();
        assert_eq!(pushed.status(), StatusCode::OK);
        let echoed: ListsPayload = serde_json::from_value(body_json(pushed).await).unwrap();
        assert_eq!(echoed.lists, vec![record.clone()]);

        // Same user through the cookie endpoint.
        let pulled = app
            .oneshot(
                Request::get(COOKIE_SYNC_PATH)
                    .header(header::COOKIE, "session=s1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(pulled.status(), StatusCode::OK);
        let pulled: ListsPayload = serde_json::from_value(body_json(pulled).await).unwrap();
        assert_eq!(pulled.lists, vec![record]);
    }

    #[tokio::test]
    async fn test_push_keeps_tombstones() {
        let (app, _temp) = test_app();
        let mut record = Record::list("Gone");
        record.mark_deleted();

        let response = app
            .oneshot(post(
                COOKIE_SYNC_PATH,
                (header::COOKIE, "session=s1"),
                &ListsPayload::new(vec![record.clone()]),
            ))
            .await
            .unwrap();
        let echoed: ListsPayload = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(echoed.lists.len(), 1);
        assert!(echoed.lists[0].deleted);
    }

    #[tokio::test]
    async fn test_malformed_push_is_rejected() {
        let (app, _temp) = test_app();
        let response = app
            .oneshot(
                Request::post(BEARER_SYNC_PATH)
                    .header(header::AUTHORIZATION, "Bearer k1")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{\"lists\": 7}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
