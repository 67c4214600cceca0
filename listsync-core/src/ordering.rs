//! Display ordering for ranked records.
//!
//! Records live in two rank namespaces: top-level items (folders and
//! ungrouped lists) and the members of each folder. The displayed sequence
//! is the top level sorted by rank, with every folder immediately followed by
//! its members sorted the same way. A folder's members are never rewritten
//! when the folder moves; they follow their header wherever it sorts.
//!
//! Index arguments refer to the full sequence produced by [`sort_by_rank`],
//! including members of collapsed folders.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::Utc;

use crate::rank::{generate_rank, MAX_CHAR, MAX_RANK, MIN_CHAR, MIN_RANK};
use crate::record::Record;

/// Folder membership lookup shared by the ordering operations.
///
/// A list whose group points at a folder that is not in the collection is
/// an orphan and is laid out at the top level.
struct Layout<'a> {
    folder_ids: HashSet<&'a str>,
}

impl<'a> Layout<'a> {
    fn new(records: &'a [Record]) -> Self {
        let folder_ids = records
            .iter()
            .filter(|r| r.is_folder())
            .map(|r| r.id.as_str())
            .collect();
        Self { folder_ids }
    }

    fn is_top_level(&self, record: &Record) -> bool {
        match (&record.group, record.is_folder()) {
            (_, true) | (None, false) => true,
            (Some(group), false) => !self.folder_ids.contains(group.as_str()),
        }
    }
}

/// Orders by rank with unranked records last, keeping their input order.
fn compare_rank(a: &Record, b: &Record) -> Ordering {
    match (&a.rank, &b.rank) {
        (Some(a), Some(b)) => a.as_bytes().cmp(b.as_bytes()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Generates a rank between two neighbours taken from stored or remote data.
///
/// Neighbour ranks are not trusted: bytes outside the rank alphabet are
/// clamped into it, an upper bound with no room above the lower one is
/// dropped, and a lower bound at or past [`MAX_RANK`] is dropped when there
/// is no upper bound.
fn rank_between(lower: Option<&str>, upper: Option<&str>) -> String {
    let lower = lower.map(clamp_to_alphabet);
    let upper = upper.map(clamp_to_alphabet);

    let floor = lower.as_deref().unwrap_or(MIN_RANK);
    let upper = upper.filter(|u| &**u > floor && !no_room_between(floor, u));
    let ceiling = upper.as_deref().unwrap_or(MAX_RANK);
    let lower = lower.filter(|l| &**l < ceiling);

    generate_rank(lower.as_deref(), upper.as_deref())
}

fn clamp_to_alphabet(rank: &str) -> Cow<'_, str> {
    if rank.bytes().all(|b| (MIN_CHAR..=MAX_CHAR).contains(&b)) {
        return Cow::Borrowed(rank);
    }
    Cow::Owned(
        rank.bytes()
            .map(|b| char::from(b.clamp(MIN_CHAR, MAX_CHAR)))
            .collect(),
    )
}

/// True when `upper` is `lower` followed only by `'0'`s, which leaves no
/// string between them.
fn no_room_between(lower: &str, upper: &str) -> bool {
    upper
        .strip_prefix(lower)
        .is_some_and(|rest| rest.bytes().all(|b| b == MIN_CHAR))
}

/// Produces the displayed sequence: top-level items by rank, each folder
/// followed by its members by rank.
pub fn sort_by_rank(records: &[Record]) -> Vec<Record> {
    let layout = Layout::new(records);

    let mut top_level: Vec<&Record> = Vec::new();
    let mut members: HashMap<&str, Vec<&Record>> = HashMap::new();
    for record in records {
        if layout.is_top_level(record) {
            top_level.push(record);
        } else if let Some(group) = record.group.as_deref() {
            members.entry(group).or_default().push(record);
        }
    }

    // Stable sort: equal or missing ranks keep their input order.
    top_level.sort_by(|a, b| compare_rank(a, b));

    let mut sequence = Vec::with_capacity(records.len());
    for item in top_level {
        sequence.push(item.clone());
        if item.is_folder() {
            if let Some(mut contents) = members.remove(item.id.as_str()) {
                contents.sort_by(|a, b| compare_rank(a, b));
                sequence.extend(contents.into_iter().cloned());
            }
        }
    }

    sequence
}

/// Assigns ranks to records that lack one, preserving the current order.
///
/// Legacy lists without a group also inherit the nearest preceding folder
/// header, since older data encoded membership by position. Returns the
/// records and whether anything was assigned.
pub fn ensure_ranks(records: Vec<Record>) -> (Vec<Record>, bool) {
    // next_ranked[i] is the first rank at or after position i.
    let mut next_ranked: Vec<Option<String>> = vec![None; records.len() + 1];
    for (i, record) in records.iter().enumerate().rev() {
        next_ranked[i] = record.rank.clone().or_else(|| next_ranked[i + 1].clone());
    }

    let mut last_rank: Option<String> = None;
    let mut current_folder: Option<String> = None;
    let mut changed = false;
    let mut result = Vec::with_capacity(records.len());

    for (i, mut record) in records.into_iter().enumerate() {
        if record.is_folder() {
            current_folder = Some(record.id.clone());
        }

        if let Some(rank) = &record.rank {
            last_rank = Some(rank.clone());
            result.push(record);
            continue;
        }

        let rank = rank_between(last_rank.as_deref(), next_ranked[i + 1].as_deref());
        record.rank = Some(rank.clone());
        if !record.is_folder() && record.group.is_none() {
            record.group = current_folder.clone();
        }
        record.touch();

        last_rank = Some(rank);
        changed = true;
        result.push(record);
    }

    (result, changed)
}

/// Moves the record at `source` so it lands at `dest` of the sequence with
/// the source removed, returning the records in their input order with only
/// the moved record changed.
///
/// # Panics
///
/// Panics if `source` or `dest` is outside the sequence.
pub fn reorder(records: &[Record], source: usize, dest: usize) -> Vec<Record> {
    assert!(
        source < records.len(),
        "source index {} out of range for {} records",
        source,
        records.len()
    );
    assert!(
        dest < records.len(),
        "destination index {} out of range for {} records",
        dest,
        records.len()
    );

    if records[source].is_folder() {
        reorder_folder(records, source, dest)
    } else {
        reorder_record(records, source, dest)
    }
}

fn reorder_record(records: &[Record], source: usize, dest: usize) -> Vec<Record> {
    let layout = Layout::new(records);
    let moving = &records[source];
    let without: Vec<&Record> = records
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != source)
        .map(|(_, r)| r)
        .collect();

    let folder = without[..dest].iter().rev().find(|r| r.is_folder()).copied();

    let (lower, upper) = match folder {
        None => {
            let lower = without[..dest]
                .iter()
                .rev()
                .find(|r| layout.is_top_level(r))
                .and_then(|r| r.rank.as_deref());
            let upper = without[dest..]
                .iter()
                .find(|r| layout.is_top_level(r))
                .and_then(|r| r.rank.as_deref());
            (lower, upper)
        }
        Some(folder) => {
            let dropped_on_collapsed_header =
                dest > 0 && without[dest - 1].id == folder.id && !folder.open;

            if dropped_on_collapsed_header {
                // Hidden members still sit below the header; land after them.
                let last_member = without
                    .iter()
                    .filter(|r| r.is_member_of(&folder.id))
                    .filter_map(|r| r.rank.as_deref())
                    .max();
                (last_member, None)
            } else {
                let lower = without[..dest]
                    .iter()
                    .rev()
                    .take_while(|r| r.id != folder.id)
                    .find(|r| r.is_member_of(&folder.id))
                    .and_then(|r| r.rank.as_deref());
                let upper = without[dest..]
                    .iter()
                    .take_while(|r| !r.is_folder())
                    .find(|r| r.is_member_of(&folder.id))
                    .and_then(|r| r.rank.as_deref());
                (lower, upper)
            }
        }
    };

    let rank = rank_between(lower, upper);
    let group = folder.map(|f| f.id.clone());

    tracing::debug!(
        id = %moving.id,
        rank = %rank,
        group = ?group,
        "reordered record"
    );

    replace_moved(records, source, |record| {
        record.rank = Some(rank);
        record.group = group;
    })
}

fn reorder_folder(records: &[Record], source: usize, dest: usize) -> Vec<Record> {
    let layout = Layout::new(records);
    let folder = &records[source];
    let is_own = |r: &Record| r.id == folder.id || r.is_member_of(&folder.id);

    let others: Vec<&Record> = records.iter().filter(|r| !is_own(r)).collect();
    let insert_at = records
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != source)
        .take(dest)
        .filter(|(_, r)| !is_own(r))
        .count();

    let lower = others[..insert_at]
        .iter()
        .rev()
        .find(|r| layout.is_top_level(r))
        .and_then(|r| r.rank.as_deref());
    let upper = others[insert_at..]
        .iter()
        .find(|r| layout.is_top_level(r))
        .and_then(|r| r.rank.as_deref());

    let rank = rank_between(lower, upper);

    tracing::debug!(id = %folder.id, rank = %rank, "reordered folder");

    replace_moved(records, source, |record| {
        record.rank = Some(rank);
    })
}

fn replace_moved(records: &[Record], source: usize, apply: impl FnOnce(&mut Record)) -> Vec<Record> {
    let mut result = records.to_vec();
    let moved = &mut result[source];
    apply(moved);
    moved.updated_at = Some(Utc::now());
    result
}

/// Rank for appending a new record at the end of `group` (or of the top
/// level when `group` is `None`). Tombstones are counted so a resurrected
/// record cannot collide with a new one.
pub fn insert_rank(records: &[Record], group: Option<&str>) -> String {
    let layout = Layout::new(records);
    let last = records
        .iter()
        .filter(|r| match group {
            Some(folder_id) => r.is_member_of(folder_id),
            None => layout.is_top_level(r),
        })
        .filter_map(|r| r.rank.as_deref())
        .max();
    rank_between(last, None)
}

/// What a list screen renders: tombstones dropped, members of collapsed
/// folders hidden, in display order.
pub fn visible(records: &[Record]) -> Vec<Record> {
    let live: Vec<Record> = records.iter().filter(|r| !r.deleted).cloned().collect();
    let sequence = sort_by_rank(&live);
    let collapsed: HashSet<&str> = live
        .iter()
        .filter(|r| r.is_folder() && !r.open)
        .map(|r| r.id.as_str())
        .collect();

    sequence
        .into_iter()
        .filter(|r| {
            r.is_folder()
                || r
                    .group
                    .as_deref()
                    .map_or(true, |g| !collapsed.contains(g))
        })
        .collect()
}
