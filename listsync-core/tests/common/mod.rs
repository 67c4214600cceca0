//! Shared fixtures for engine tests.
//!
//! `MockServer` is an in-memory sync server that applies server-side
//! last-write-wins and can be scripted to fail. `RecordingBridge` is a host
//! bridge that counts refresh requests and auth failures.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use listsync_core::{
    reconcile, BearerCredentials, EngineSettings, HostBridge, ListsPayload, MemoryStore, Method,
    Record, Store, SyncEngine, SyncRequest, SyncResponse, Transport, TransportError,
};
use tokio::time::Instant;

pub const BASE_URL: &str = "http://lists.test";

/// A scripted answer consumed before normal handling.
#[derive(Debug, Clone)]
pub enum Scripted {
    Unreachable,
    Status(u16),
    Body(String),
}

/// A request as seen by the server.
#[derive(Debug, Clone)]
pub struct Received {
    pub request: SyncRequest,
    pub at: Instant,
}

impl Received {
    pub fn lists(&self) -> Vec<Record> {
        self.request
            .body
            .clone()
            .and_then(|body| serde_json::from_value::<ListsPayload>(body).ok())
            .map(|payload| payload.lists)
            .unwrap_or_default()
    }
}

pub struct MockServer {
    records: Mutex<Vec<Record>>,
    tokens: Mutex<HashSet<String>>,
    session_valid: AtomicBool,
    script: Mutex<VecDeque<Scripted>>,
    received: Mutex<Vec<Received>>,
    latency: Mutex<Duration>,
}

impl MockServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
            tokens: Mutex::new(HashSet::from(["token-1".to_string()])),
            session_valid: AtomicBool::new(true),
            script: Mutex::new(VecDeque::new()),
            received: Mutex::new(Vec::new()),
            latency: Mutex::new(Duration::ZERO),
        })
    }

    pub fn with_records(records: Vec<Record>) -> Arc<Self> {
        let server = Self::new();
        *server.records.lock().unwrap() = records;
        server
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    pub fn set_records(&self, records: Vec<Record>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn accept_only(&self, tokens: &[&str]) {
        *self.tokens.lock().unwrap() = tokens.iter().map(|t| t.to_string()).collect();
    }

    pub fn set_session_valid(&self, valid: bool) {
        self.session_valid.store(valid, Ordering::SeqCst);
    }

    pub fn script(&self, answers: impl IntoIterator<Item = Scripted>) {
        self.script.lock().unwrap().extend(answers);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<Received> {
        self.received()
            .into_iter()
            .filter(|r| r.request.method == Method::Post)
            .collect()
    }

    pub fn gets(&self) -> Vec<Received> {
        self.received()
            .into_iter()
            .filter(|r| r.request.method == Method::Get)
            .collect()
    }

    fn authorized(&self, request: &SyncRequest) -> bool {
        match &request.bearer_token {
            Some(token) => self.tokens.lock().unwrap().contains(token),
            None => self.session_valid.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl Transport for MockServer {
    async fn send(&self, request: SyncRequest) -> Result<SyncResponse, TransportError> {
        self.received.lock().unwrap().push(Received {
            request: request.clone(),
            at: Instant::now(),
        });

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(Scripted::Unreachable) => {
                return Err(TransportError::Unreachable("scripted".to_string()))
            }
            Some(Scripted::Status(status)) => return Ok(SyncResponse::new(status, "")),
            Some(Scripted::Body(body)) => return Ok(SyncResponse::new(200, body)),
            None => {}
        }

        if !self.authorized(&request) {
            return Ok(SyncResponse::new(401, r#"{"error":"unauthorized"}"#));
        }

        match request.method {
            Method::Get => {
                let payload = ListsPayload::new(self.records());
                Ok(SyncResponse::json(200, &serde_json::to_value(payload).unwrap()))
            }
            Method::Post => {
                let incoming: ListsPayload = match request.body {
                    Some(body) => match serde_json::from_value(body) {
                        Ok(payload) => payload,
                        Err(_) => return Ok(SyncResponse::new(400, "")),
                    },
                    None => return Ok(SyncResponse::new(400, "")),
                };
                let mut records = self.records.lock().unwrap();
                let merged = reconcile(&records, &incoming.lists);
                *records = merged.clone();
                let payload = ListsPayload::new(merged);
                Ok(SyncResponse::json(200, &serde_json::to_value(payload).unwrap()))
            }
        }
    }
}

/// How the bridge answers a refresh request.
#[derive(Debug, Clone)]
pub enum RefreshBehavior {
    /// No host: the request is refused.
    Unavailable,
    /// Switches to the given token and reports success immediately.
    Rotate(String),
    /// Reports failure immediately.
    Fail,
    /// Accepts the request and never answers.
    Silent,
}

pub struct RecordingBridge {
    credentials: Mutex<Option<BearerCredentials>>,
    behavior: Mutex<RefreshBehavior>,
    engine: OnceLock<SyncEngine>,
    pub refresh_requests: AtomicUsize,
    pub auth_failures: AtomicUsize,
}

impl RecordingBridge {
    pub fn bearer(token: &str, behavior: RefreshBehavior) -> Arc<Self> {
        Arc::new(Self {
            credentials: Mutex::new(Some(BearerCredentials::new(token, BASE_URL))),
            behavior: Mutex::new(behavior),
            engine: OnceLock::new(),
            refresh_requests: AtomicUsize::new(0),
            auth_failures: AtomicUsize::new(0),
        })
    }

    pub fn cookie() -> Arc<Self> {
        let bridge = Self::bearer("", RefreshBehavior::Unavailable);
        *bridge.credentials.lock().unwrap() = None;
        bridge
    }

    /// Lets the bridge answer refresh requests on the engine.
    pub fn attach(&self, engine: &SyncEngine) {
        let _ = self.engine.set(engine.clone());
    }

    pub fn set_behavior(&self, behavior: RefreshBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_requests.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> usize {
        self.auth_failures.load(Ordering::SeqCst)
    }
}

impl HostBridge for RecordingBridge {
    fn credentials(&self) -> Option<BearerCredentials> {
        self.credentials.lock().unwrap().clone()
    }

    fn request_token_refresh(&self) -> bool {
        self.refresh_requests.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            RefreshBehavior::Unavailable => false,
            RefreshBehavior::Silent => true,
            RefreshBehavior::Fail => {
                if let Some(engine) = self.engine.get() {
                    engine.complete_token_refresh(false);
                }
                true
            }
            RefreshBehavior::Rotate(token) => {
                *self.credentials.lock().unwrap() = Some(BearerCredentials::new(token, BASE_URL));
                if let Some(engine) = self.engine.get() {
                    engine.complete_token_refresh(true);
                }
                true
            }
        }
    }

    fn on_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::SeqCst);
    }
}

/// Everything a test needs to drive an engine.
pub struct Harness {
    pub engine: SyncEngine,
    pub store: Arc<MemoryStore>,
    pub server: Arc<MockServer>,
    pub bridge: Arc<RecordingBridge>,
}

impl Harness {
    pub fn new(server: Arc<MockServer>, bridge: Arc<RecordingBridge>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let engine = SyncEngine::new(
            EngineSettings::new(BASE_URL),
            store.clone(),
            server.clone(),
            bridge.clone(),
        );
        bridge.attach(&engine);
        Self {
            engine,
            store,
            server,
            bridge,
        }
    }

    pub fn bearer() -> Self {
        Self::new(
            MockServer::new(),
            RecordingBridge::bearer("token-1", RefreshBehavior::Unavailable),
        )
    }

    /// Saves `records` locally and pushes them, as an app does after an edit.
    pub fn edit(&self, records: Vec<Record>) {
        self.store.save_records(&records).unwrap();
        self.engine.push(records);
    }
}

pub fn list(id: &str, rank: &str) -> Record {
    let mut record = Record::list(id).with_rank(rank);
    record.id = id.to_string();
    record
}

/// Lets spawned tasks run without advancing the clock.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
