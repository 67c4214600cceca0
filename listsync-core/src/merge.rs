//! Last-write-wins reconciliation of record collections.
//!
//! Merge granularity is the whole record; `updated_at` is the only
//! tie-breaker. Deletions travel as tombstones (`deleted = true`) so they can
//! win or lose against concurrent edits like any other write.

use std::collections::{HashMap, HashSet};

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::ordering::sort_by_rank;
use crate::record::Record;

/// How long a tombstone is kept locally before it may be collected.
pub const TOMBSTONE_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Merges a remote snapshot into the local collection.
///
/// - A local tombstone yields only to a strictly newer remote copy.
/// - A local record unknown to the remote is kept.
/// - Otherwise the newer copy wins and the local copy wins ties.
/// - Remote records unknown locally are appended unless tombstoned.
///
/// Local tombstones that survive stay in the result so they keep
/// propagating; use [`live`] for display. The result is sorted for display.
pub fn merge(local: &[Record], remote: &[Record]) -> Vec<Record> {
    let remote_by_id: HashMap<&str, &Record> =
        remote.iter().map(|r| (r.id.as_str(), r)).collect();
    let mut seen: HashSet<&str> = HashSet::with_capacity(local.len());
    let mut merged = Vec::with_capacity(local.len().max(remote.len()));

    for local_record in local {
        seen.insert(local_record.id.as_str());
        let remote_record = remote_by_id.get(local_record.id.as_str()).copied();

        let winner = match remote_record {
            None => local_record,
            Some(remote_record) if local_record.deleted => {
                if remote_record.timestamp_or_epoch() > local_record.timestamp_or_epoch() {
                    remote_record
                } else {
                    local_record
                }
            }
            Some(remote_record) => {
                if local_record.timestamp_or_epoch() >= remote_record.timestamp_or_epoch() {
                    local_record
                } else {
                    remote_record
                }
            }
        };
        merged.push(winner.clone());
    }

    merged.extend(
        remote
            .iter()
            .filter(|r| !seen.contains(r.id.as_str()) && !r.deleted)
            .cloned(),
    );

    sort_by_rank(&merged)
}

/// Symmetric last-write-wins union used by the server side.
///
/// Every id from either side is kept, tombstones included; the newer copy
/// wins and `stored` wins ties. Order follows `stored`, then new ids in
/// `incoming` order.
pub fn reconcile(stored: &[Record], incoming: &[Record]) -> Vec<Record> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(stored.len());
    let mut result: Vec<Record> = Vec::with_capacity(stored.len() + incoming.len());

    for record in stored {
        index.insert(record.id.clone(), result.len());
        result.push(record.clone());
    }

    for record in incoming {
        match index.get(&record.id) {
            Some(&i) => {
                if record.timestamp_or_epoch() > result[i].timestamp_or_epoch() {
                    result[i] = record.clone();
                }
            }
            None => {
                index.insert(record.id.clone(), result.len());
                result.push(record.clone());
            }
        }
    }

    result
}

/// Records that are not tombstoned.
pub fn live(records: &[Record]) -> Vec<Record> {
    records.iter().filter(|r| !r.deleted).cloned().collect()
}

/// Drops tombstones last touched more than `retention` before `now`.
/// Live records are never removed. Returns the kept records and how many
/// were dropped.
pub fn collect_garbage(
    records: Vec<Record>,
    now: DateTime<Utc>,
    retention: Duration,
) -> (Vec<Record>, usize) {
    let before = records.len();
    let kept: Vec<Record> = records
        .into_iter()
        .filter(|r| {
            // Timestamps in the future have a negative age and are kept.
            !r.deleted
                || now
                    .signed_duration_since(r.timestamp_or_epoch())
                    .to_std()
                    .map_or(true, |age| age < retention)
        })
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}
