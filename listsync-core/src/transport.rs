//! HTTP plumbing between the sync engine and the server.
//!
//! The engine only ever builds [`SyncRequest`]s and reads [`SyncResponse`]s;
//! anything that can deliver them implements [`Transport`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::Url;
use thiserror::Error;
use tracing::debug;

/// Name of the cookie carrying the web session in cookie mode.
pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// A request against the sync endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    pub method: Method,
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub bearer_token: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl SyncRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            bearer_token: None,
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            bearer_token: None,
            body: Some(body),
        }
    }

    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }
}

/// Raw server answer. The body is parsed by the caller so a malformed
/// payload can be told apart from a failed request.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResponse {
    pub status: u16,
    pub body: String,
}

impl SyncResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

/// Failures below the HTTP status level.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL {0}")]
    InvalidUrl(String),
    #[error("server unreachable: {0}")]
    Unreachable(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: SyncRequest) -> Result<SyncResponse, TransportError>;
}

/// [`Transport`] backed by `reqwest`, with a cookie jar for cookie mode.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    jar: Arc<Jar>,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .build()?;
        Ok(Self { client, jar })
    }

    /// Creates a transport whose jar already holds a session cookie for
    /// `origin`, as a browser would after logging in.
    pub fn with_session(origin: &str, session: &str) -> Result<Self, TransportError> {
        let transport = Self::new()?;
        transport.set_session(origin, session)?;
        Ok(transport)
    }

    pub fn set_session(&self, origin: &str, session: &str) -> Result<(), TransportError> {
        let url = Url::parse(origin).map_err(|_| TransportError::InvalidUrl(origin.to_string()))?;
        self.jar
            .add_cookie_str(&format!("{}={}; Path=/", SESSION_COOKIE, session), &url);
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: SyncRequest) -> Result<SyncResponse, TransportError> {
        let url = Url::parse(&request.url).map_err(|_| TransportError::InvalidUrl(request.url.clone()))?;
        debug!(method = %request.method, url = %url, "sending sync request");

        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(SyncResponse { status, body })
    }
}
