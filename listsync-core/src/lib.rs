//! listsync core library
//!
//! Rank-ordered lists and folders, stored locally and synced in the
//! background with last-write-wins merging.

pub mod bridge;
pub mod engine;
pub mod merge;
pub mod ordering;
pub mod rank;
pub mod record;
pub mod store;
pub mod transport;

pub use bridge::{BearerCredentials, HostBridge, NoopBridge, StaticBridge};
pub use engine::{EngineSettings, Endpoint, SyncEngine, SyncPhase, SyncStatus};
pub use merge::{collect_garbage, live, merge, reconcile, TOMBSTONE_RETENTION};
pub use ordering::{ensure_ranks, insert_rank, reorder, sort_by_rank, visible};
pub use rank::{generate_rank, MAX_RANK, MIN_RANK};
pub use record::{ListsPayload, Record, RecordKind};
pub use store::{FileStore, MemoryStore, Settings, Store, StoreError};
pub use transport::{HttpTransport, Method, SyncRequest, SyncResponse, Transport, TransportError};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
