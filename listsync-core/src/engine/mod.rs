//! Offline-first sync engine.
//!
//! The local store is the source of truth. Changes are pushed to the server
//! in the background, debounced and retried; pulls merge the server's copy
//! into the local one with last-write-wins per record.
//!
//! ## Rounds
//!
//! A round is one POST of the whole collection. Only one round runs at a
//! time: a push requested while a round is in flight is kept in a
//! single-slot queue (latest wins) and replayed straight after, without
//! going back to idle. Every round stays visible as syncing for at least
//! [`EngineSettings::min_busy`]; the padding is added after the request,
//! never before it.
//!
//! ## Timers
//!
//! `push` (re)arms a debounce timer and makes sure the periodic retry timer
//! runs. Timers only trigger rounds; a round is never cancelled once it has
//! started. Timer tasks hold a weak reference to the engine and exit once
//! every handle has been dropped.
//!
//! ## Authentication
//!
//! With bearer credentials from the [`HostBridge`] a 401 triggers one shared
//! token refresh and a single retry. A failed refresh, a timeout or a second
//! 401 puts the engine into [`SyncPhase::AuthError`], which only
//! [`SyncEngine::reset_auth`] leaves. Without credentials the engine relies
//! on session cookies and memoizes whether the session is valid.

mod refresh;
mod settings;
mod status;

pub use settings::{
    EngineSettings, BEARER_SYNC_PATH, COOKIE_SYNC_PATH, DEFAULT_DEBOUNCE, DEFAULT_MIN_BUSY,
    DEFAULT_REFRESH_TIMEOUT, DEFAULT_RETRY_INTERVAL,
};
pub use status::{SyncPhase, SyncStatus};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::bridge::HostBridge;
use crate::merge::{self, live, merge};
use crate::ordering::ensure_ranks;
use crate::record::{ListsPayload, Record};
use crate::store::Store;
use crate::transport::{SyncRequest, SyncResponse, Transport, TransportError};

use refresh::PendingRefresh;
use settings::join_url;

/// Where the engine sends requests, and with which credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub bearer_token: Option<String>,
}

impl Endpoint {
    pub fn is_bearer(&self) -> bool {
        self.bearer_token.is_some()
    }

    /// A POST carrying `body`, or a GET when there is none.
    fn request(&self, body: Option<&serde_json::Value>) -> SyncRequest {
        let request = match body {
            Some(body) => SyncRequest::post(&self.url, body.clone()),
            None => SyncRequest::get(&self.url),
        };
        request.with_bearer(self.bearer_token.clone())
    }
}

#[derive(Default)]
struct State {
    syncing: bool,
    pending: bool,
    auth_error: bool,
    /// Cookie-mode session memo; bearer mode always reports `Some(true)`.
    authenticated: Option<bool>,
    last_synced_at: Option<DateTime<Utc>>,
    /// Bumped by every push. A round only clears `pending` if it saw the
    /// latest revision.
    revision: u64,
    /// The debounce elapsed and its round is waiting on the auth check.
    starting: bool,
    queued: Option<Vec<Record>>,
    debounce: Option<JoinHandle<()>>,
    debounce_gen: u64,
    periodic: Option<JoinHandle<()>>,
    refresh: Option<PendingRefresh>,
    refresh_seq: u64,
}

impl State {
    fn status(&self) -> SyncStatus {
        let phase = if self.auth_error {
            SyncPhase::AuthError
        } else if self.syncing {
            SyncPhase::Syncing
        } else if self.debounce.is_some() || self.starting {
            SyncPhase::DebouncePending
        } else {
            SyncPhase::Idle
        };

        SyncStatus {
            phase,
            is_syncing: self.syncing,
            has_pending_changes: self.pending,
            last_synced_at: self.last_synced_at,
            is_authenticated: self.authenticated,
            auth_error: self.auth_error,
        }
    }

    fn cancel_debounce(&mut self) {
        if let Some(handle) = self.debounce.take() {
            handle.abort();
        }
        self.debounce_gen += 1;
    }

    fn cancel_timers(&mut self) {
        self.cancel_debounce();
        if let Some(handle) = self.periodic.take() {
            handle.abort();
        }
    }
}

struct Inner {
    settings: EngineSettings,
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    bridge: Arc<dyn HostBridge>,
    state: Mutex<State>,
    status: watch::Sender<SyncStatus>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel_timers();
    }
}

/// Handle to a sync engine. Clones share the same engine.
///
/// Methods that arm timers (`push`, `reset_auth`) must be called from
/// within a Tokio runtime.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    pub fn new(
        settings: EngineSettings,
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        bridge: Arc<dyn HostBridge>,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            inner: Arc::new(Inner {
                settings,
                store,
                transport,
                bridge,
                state: Mutex::new(State::default()),
                status,
            }),
        }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State) {
        self.inner.status.send_replace(state.status());
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// Subscribes to status changes. The receiver starts out holding the
    /// current status.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.status.borrow().clone()
    }

    /// Resolves the sync endpoint for the current credentials.
    pub fn endpoint(&self) -> Endpoint {
        match self.inner.bridge.credentials() {
            Some(credentials) if !credentials.token.is_empty() => Endpoint {
                url: join_url(&credentials.base_url, BEARER_SYNC_PATH),
                bearer_token: Some(credentials.token),
            },
            _ => Endpoint {
                url: join_url(&self.inner.settings.base_url, COOKIE_SYNC_PATH),
                bearer_token: None,
            },
        }
    }

    /// Reports whether sync requests can be made.
    ///
    /// Bearer mode is authenticated whenever the host has a token. Cookie
    /// mode asks the server once and remembers a definite answer (success or
    /// 401/403); network failures and other statuses are not remembered.
    pub async fn check_auth(&self) -> bool {
        let endpoint = self.endpoint();
        {
            let mut state = self.lock();
            if state.auth_error {
                return false;
            }
            if endpoint.is_bearer() {
                if state.authenticated != Some(true) {
                    state.authenticated = Some(true);
                    self.publish(&state);
                }
                return true;
            }
            if let Some(known) = state.authenticated {
                return known;
            }
        }

        debug!(url = %endpoint.url, "checking session");
        match self
            .inner
            .transport
            .send(endpoint.request(None))
            .await
        {
            Ok(response) => {
                let known = match response.status {
                    s if (200..300).contains(&s) => Some(true),
                    401 | 403 => Some(false),
                    _ => None,
                };
                debug!(status = response.status, ?known, "session checked");
                if let Some(authenticated) = known {
                    let mut state = self.lock();
                    state.authenticated = Some(authenticated);
                    self.publish(&state);
                }
                known.unwrap_or(false)
            }
            Err(e) => {
                warn!(error = %e, "auth check failed");
                false
            }
        }
    }

    /// Forgets the session memo. Call on login or logout.
    pub fn reset_auth_cache(&self) {
        let mut state = self.lock();
        state.authenticated = None;
        self.publish(&state);
    }

    /// Marks changes pending and schedules delivery of `records`.
    ///
    /// Restarts the debounce timer and starts the retry timer if needed.
    /// While in auth-error the change is only marked pending.
    pub fn push(&self, records: Vec<Record>) {
        let mut state = self.lock();
        state.pending = true;
        state.revision += 1;

        if state.auth_error {
            debug!("auth error; keeping change pending");
            self.publish(&state);
            return;
        }

        self.start_periodic(&mut state);
        state.cancel_debounce();

        let generation = state.debounce_gen;
        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.settings.debounce;
        state.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(engine) = SyncEngine::from_weak(&weak) else {
                return;
            };
            {
                let mut state = engine.lock();
                if state.debounce_gen != generation {
                    return;
                }
                state.debounce = None;
                state.starting = true;
            }
            engine.deliver(records).await;
        }));

        self.publish(&state);
    }

    /// Sends pending changes now, skipping the debounce and the pull.
    ///
    /// Returns `true` if the local collection was delivered.
    pub async fn flush(&self) -> bool {
        {
            let mut state = self.lock();
            if !state.pending || state.auth_error {
                return false;
            }
            state.cancel_debounce();
            self.publish(&state);
        }

        let records = self.inner.store.load_records();
        if records.is_empty() {
            let mut state = self.lock();
            state.pending = false;
            self.publish(&state);
            return false;
        }
        self.deliver(records).await
    }

    /// Fetches the server's collection and merges it into `local`.
    ///
    /// Any failure returns `local` unchanged.
    pub async fn pull(&self, local: &[Record]) -> Vec<Record> {
        if !self.check_auth().await {
            debug!("not authenticated; using local lists");
            return local.to_vec();
        }

        match self.fetch_remote().await {
            Some(remote) => {
                let merged = merge(local, &remote);
                info!(
                    local = local.len(),
                    remote = remote.len(),
                    merged = merged.len(),
                    "pulled lists"
                );
                merged
            }
            None => local.to_vec(),
        }
    }

    /// Startup path: backfills ranks, pulls, and persists the result.
    ///
    /// Returns the live records. Backfilled ranks are pushed like any other
    /// local change.
    pub async fn pull_and_store(&self) -> Vec<Record> {
        let (local, backfilled) = ensure_ranks(self.inner.store.load_records());
        let merged = self.pull(&local).await;

        if backfilled || merged != local {
            if let Err(e) = self.inner.store.save_records(&merged) {
                warn!(error = %e, "failed to persist pulled lists");
            }
        }
        if backfilled {
            self.push(merged.clone());
        }
        live(&merged)
    }

    /// Pushes the local collection, pulls the server's, merges and persists.
    ///
    /// Bypasses the debounce. Returns the live merged records, or `None` if
    /// the engine is busy, unauthenticated or any step failed.
    pub async fn force_sync(&self) -> Option<Vec<Record>> {
        if !self.check_auth().await {
            return None;
        }

        let revision = {
            let mut state = self.lock();
            if state.auth_error || state.syncing {
                return None;
            }
            state.syncing = true;
            state.cancel_debounce();
            self.publish(&state);
            state.revision
        };

        let started = Instant::now();
        let result = self.push_then_pull(revision).await;
        self.pad(started).await;

        let mut state = self.lock();
        let queued = state.queued.take();
        match queued {
            Some(next) if !state.auth_error => {
                let revision = state.revision;
                self.publish(&state);
                drop(state);
                let engine = self.clone();
                tokio::spawn(async move {
                    engine.drive(next, revision).await;
                });
            }
            _ => {
                state.syncing = false;
                self.publish(&state);
            }
        }

        if result.is_none() {
            warn!("force sync failed");
        }
        result
    }

    /// Removes tombstones older than the retention period from the local
    /// store. Skipped while changes are pending so a tombstone is never
    /// dropped before it reached the server. Returns how many were removed.
    pub fn collect_garbage(&self) -> usize {
        if self.lock().pending {
            debug!("changes pending; skipping tombstone collection");
            return 0;
        }

        let records = self.inner.store.load_records();
        let (kept, removed) = merge::collect_garbage(
            records,
            Utc::now(),
            self.inner.settings.tombstone_retention,
        );
        if removed > 0 {
            if let Err(e) = self.inner.store.save_records(&kept) {
                warn!(error = %e, "failed to persist collected lists");
                return 0;
            }
            info!(removed, "collected tombstones");
        }
        removed
    }

    /// Leaves auth-error after the host has re-authenticated.
    pub fn reset_auth(&self) {
        let mut state = self.lock();
        state.auth_error = false;
        state.authenticated = Some(true);
        self.start_periodic(&mut state);
        self.publish(&state);
        info!("auth reset; sync resumed");
    }

    /// Delivers the host's answer to a pending token refresh.
    pub fn complete_token_refresh(&self, success: bool) {
        let mut state = self.lock();
        let delivered = state
            .refresh
            .as_mut()
            .is_some_and(|pending| pending.complete(success));
        if delivered {
            debug!(success, "token refresh completed");
        } else {
            debug!(success, "no token refresh pending");
        }
    }

    /// Stops both timers. A round already in flight still completes.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.cancel_timers();
        self.publish(&state);
        debug!("sync engine stopped");
    }

    fn start_periodic(&self, state: &mut State) {
        if state.periodic.is_some() {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.settings.retry_interval;
        state.periodic = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(engine) = SyncEngine::from_weak(&weak) else {
                    break;
                };
                engine.retry_pending();
            }
        }));
    }

    fn retry_pending(&self) {
        {
            let state = self.lock();
            if !state.pending || state.syncing || state.auth_error {
                return;
            }
        }

        let records = self.inner.store.load_records();
        if records.is_empty() {
            let mut state = self.lock();
            state.pending = false;
            self.publish(&state);
            return;
        }

        debug!(count = records.len(), "retrying pending changes");
        let engine = self.clone();
        tokio::spawn(async move {
            engine.deliver(records).await;
        });
    }

    /// Starts a round for `records`, or queues them if one is in flight.
    async fn deliver(&self, records: Vec<Record>) -> bool {
        let authenticated = self.check_auth().await;

        let revision = {
            let mut state = self.lock();
            state.starting = false;
            if !authenticated || state.auth_error {
                self.publish(&state);
                return false;
            }
            if state.syncing {
                debug!("round in flight; queueing latest payload");
                state.queued = Some(records);
                self.publish(&state);
                return false;
            }
            state.syncing = true;
            self.publish(&state);
            state.revision
        };

        self.drive(records, revision).await
    }

    /// Runs rounds until the queue is empty. `syncing` must already be set.
    async fn drive(&self, mut records: Vec<Record>, mut revision: u64) -> bool {
        loop {
            let started = Instant::now();
            let delivered = self.post(&records).await;
            if delivered {
                let mut state = self.lock();
                state.last_synced_at = Some(Utc::now());
                if state.queued.is_none() && state.revision == revision {
                    state.pending = false;
                }
                self.publish(&state);
            }

            self.pad(started).await;

            let mut state = self.lock();
            let queued = state.queued.take();
            match queued {
                Some(next) if !state.auth_error => {
                    debug!("replaying queued payload");
                    revision = state.revision;
                    records = next;
                    self.publish(&state);
                }
                _ => {
                    state.syncing = false;
                    self.publish(&state);
                    return delivered;
                }
            }
        }
    }

    async fn pad(&self, started: Instant) {
        let remaining = self.inner.settings.min_busy.saturating_sub(started.elapsed());
        if !remaining.is_zero() {
            tokio::time::sleep(remaining).await;
        }
    }

    async fn post(&self, records: &[Record]) -> bool {
        let now = Utc::now();
        let payload = ListsPayload::new(
            records
                .iter()
                .map(|r| r.with_timestamp_backfilled(now))
                .collect(),
        );
        let body = match serde_json::to_value(&payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "failed to encode lists");
                return false;
            }
        };

        match self.send(Some(&body)).await {
            Ok(response) if response.is_success() => {
                info!(count = records.len(), "pushed lists");
                true
            }
            Ok(response) => {
                warn!(status = response.status, "push rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "push failed");
                false
            }
        }
    }

    async fn push_then_pull(&self, revision: u64) -> Option<Vec<Record>> {
        let local = self.inner.store.load_records();
        if !self.post(&local).await {
            return None;
        }

        let remote = self.fetch_remote().await?;
        let merged = merge(&local, &remote);
        if let Err(e) = self.inner.store.save_records(&merged) {
            warn!(error = %e, "failed to persist merged lists");
            return None;
        }

        let mut state = self.lock();
        state.last_synced_at = Some(Utc::now());
        if state.queued.is_none() && state.revision == revision {
            state.pending = false;
        }
        self.publish(&state);
        info!(count = merged.len(), "force sync complete");
        Some(live(&merged))
    }

    async fn fetch_remote(&self) -> Option<Vec<Record>> {
        let response = match self.send(None).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "pull failed");
                return None;
            }
        };
        if !response.is_success() {
            warn!(status = response.status, "pull rejected");
            return None;
        }

        match serde_json::from_str::<ListsPayload>(&response.body) {
            Ok(payload) => Some(payload.lists),
            Err(e) => {
                warn!(error = %e, "malformed sync payload");
                None
            }
        }
    }

    /// Sends one request, refreshing the bearer token once on a 401.
    async fn send(&self, body: Option<&serde_json::Value>) -> Result<SyncResponse, TransportError> {
        let endpoint = self.endpoint();
        let response = self
            .inner
            .transport
            .send(endpoint.request(body))
            .await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        if !endpoint.is_bearer() {
            warn!("session rejected by server");
            let mut state = self.lock();
            state.authenticated = Some(false);
            self.publish(&state);
            return Ok(response);
        }

        warn!("401 received, requesting token refresh");
        if !self.refresh_token().await {
            self.enter_auth_error();
            return Ok(response);
        }

        let retry = self
            .inner
            .transport
            .send(self.endpoint().request(body))
            .await?;
        if retry.is_unauthorized() {
            self.enter_auth_error();
        }
        Ok(retry)
    }

    /// Joins the in-flight refresh, or starts one.
    async fn refresh_token(&self) -> bool {
        let (id, future, started) = {
            let mut state = self.lock();
            match &state.refresh {
                Some(pending) => (pending.id, pending.future.clone(), false),
                None => {
                    state.refresh_seq += 1;
                    let pending =
                        PendingRefresh::start(state.refresh_seq, self.inner.settings.refresh_timeout);
                    let joined = (pending.id, pending.future.clone(), true);
                    state.refresh = Some(pending);
                    joined
                }
            }
        };

        if started && !self.inner.bridge.request_token_refresh() {
            debug!("host cannot refresh tokens");
            self.complete_token_refresh(false);
        }

        let refreshed = future.await;

        let mut state = self.lock();
        if state.refresh.as_ref().is_some_and(|pending| pending.id == id) {
            state.refresh = None;
        }
        refreshed
    }

    fn enter_auth_error(&self) {
        {
            let mut state = self.lock();
            if state.auth_error {
                return;
            }
            state.auth_error = true;
            state.authenticated = Some(false);
            state.cancel_timers();
            self.publish(&state);
        }

        warn!("authentication failed; sync paused until reset");
        self.inner.bridge.on_auth_failure();
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("settings", &self.inner.settings)
            .field("status", &self.status())
            .finish()
    }
}
