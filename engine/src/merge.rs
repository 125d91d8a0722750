//! Snapshot merge: reconciling a local snapshot with a remote one.
//!
//! # Algorithm
//!
//! 1. Union the tombstone sets by task id, keeping the later `deletedOn`
//! 2. Scan every task, local categories first then remote, in category scan
//!    order; tombstoned ids are skipped outright (deletion beats any edit,
//!    however recent)
//! 3. For an id seen twice, the later copy replaces the earlier one only if
//!    its `lastModified` is strictly greater, so exact ties keep the local copy
//! 4. Rebuild the categories from each winner's recorded category
//! 5. Stable-sort every category by `lastModified`, most recent first
//!
//! The result carries the remote `lastSync` marker.

use crate::{Categories, Category, Snapshot, Task, TaskId, Timestamp, Tombstone};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Which snapshot a task copy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Local,
    Remote,
}

/// How a conflict was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictResolution {
    /// The local copy was newer, or tied
    LocalWins,
    /// The remote copy was strictly newer
    RemoteWins,
}

/// A task present on both sides with differing content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub task_id: TaskId,
    pub local_modified: Timestamp,
    pub remote_modified: Timestamp,
    pub resolution: ConflictResolution,
}

/// What a merge did, for logging and user feedback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    /// Winning tasks taken from the local snapshot
    pub from_local: usize,
    /// Winning tasks taken from the remote snapshot
    pub from_remote: usize,
    /// Ids dropped because a tombstone exists for them
    pub suppressed: Vec<TaskId>,
    /// Ids seen on both sides with different content
    pub conflicts: Vec<Conflict>,
    /// Size of the tombstone union
    pub tombstones: usize,
}

impl MergeReport {
    /// Whether the remote side contributed anything the local side lacked.
    pub fn remote_changes(&self) -> bool {
        self.from_remote > 0 || !self.suppressed.is_empty()
    }
}

/// A candidate winner during the scan.
#[derive(Debug, Clone)]
struct Slot {
    category: Category,
    task: Task,
    side: Side,
}

/// Merge two snapshots.
pub fn merge(local: &Snapshot, remote: &Snapshot) -> Snapshot {
    merge_with_report(local, remote).0
}

/// Merge two snapshots and describe what happened.
pub fn merge_with_report(local: &Snapshot, remote: &Snapshot) -> (Snapshot, MergeReport) {
    let tombstones = merge_tombstones(&local.tombstones, &remote.tombstones);

    let (slots, mut report) = {
        let deleted: HashSet<&TaskId> = tombstones.iter().map(Tombstone::id).collect();
        let mut merger = Merger::new(&deleted);
        merger.scan(&local.categories, Side::Local);
        merger.scan(&remote.categories, Side::Remote);
        (merger.slots, merger.report)
    };

    let mut categories = Categories::new();
    for slot in slots {
        match slot.side {
            Side::Local => report.from_local += 1,
            Side::Remote => report.from_remote += 1,
        }
        categories.push(slot.category, slot.task);
    }
    for category in Category::ALL {
        // sort_by is stable: equal timestamps keep first-scanned order
        categories
            .get_mut(category)
            .sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
    }
    report.tombstones = tombstones.len();

    let snapshot = Snapshot {
        format_version: crate::SNAPSHOT_FORMAT_VERSION,
        categories,
        tombstones,
        last_sync: remote.last_sync,
    };
    (snapshot, report)
}

/// Union two tombstone lists by task id.
///
/// First-seen order is kept; when both sides hold the same id the later
/// `deletedOn` wins, ties keep the local entry.
pub fn merge_tombstones(local: &[Tombstone], remote: &[Tombstone]) -> Vec<Tombstone> {
    let mut merged: Vec<Tombstone> = Vec::with_capacity(local.len() + remote.len());
    let mut index: HashMap<TaskId, usize> = HashMap::new();

    for tombstone in local.iter().chain(remote) {
        match index.get(tombstone.id()) {
            Some(&i) => {
                if tombstone.deleted_on > merged[i].deleted_on {
                    merged[i] = tombstone.clone();
                }
            }
            None => {
                index.insert(tombstone.id().clone(), merged.len());
                merged.push(tombstone.clone());
            }
        }
    }

    merged
}

/// Accumulates winners in first-seen order.
struct Merger<'a> {
    deleted: &'a HashSet<&'a TaskId>,
    slots: Vec<Slot>,
    index: HashMap<TaskId, usize>,
    suppressed: HashSet<TaskId>,
    report: MergeReport,
}

impl<'a> Merger<'a> {
    fn new(deleted: &'a HashSet<&'a TaskId>) -> Self {
        Self {
            deleted,
            slots: Vec::new(),
            index: HashMap::new(),
            suppressed: HashSet::new(),
            report: MergeReport::default(),
        }
    }

    fn scan(&mut self, categories: &Categories, side: Side) {
        for (category, task) in categories.iter() {
            self.offer(category, task, side);
        }
    }

    fn offer(&mut self, category: Category, task: &Task, side: Side) {
        if self.deleted.contains(&task.id) {
            if self.suppressed.insert(task.id.clone()) {
                self.report.suppressed.push(task.id.clone());
            }
            return;
        }

        let Some(&i) = self.index.get(&task.id) else {
            self.index.insert(task.id.clone(), self.slots.len());
            self.slots.push(Slot {
                category,
                task: task.clone(),
                side,
            });
            return;
        };

        let existing = &self.slots[i];
        let replace = task.last_modified > existing.task.last_modified;

        if existing.side != side && (existing.task != *task || existing.category != category) {
            let (local_modified, remote_modified) = match side {
                Side::Remote => (existing.task.last_modified, task.last_modified),
                Side::Local => (task.last_modified, existing.task.last_modified),
            };
            let resolution = match (replace, side) {
                (true, Side::Remote) | (false, Side::Local) => ConflictResolution::RemoteWins,
                (true, Side::Local) | (false, Side::Remote) => ConflictResolution::LocalWins,
            };
            self.report.conflicts.push(Conflict {
                task_id: task.id.clone(),
                local_modified,
                remote_modified,
                resolution,
            });
        }

        if replace {
            self.slots[i] = Slot {
                category,
                task: task.clone(),
                side,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn t(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn task(id: &str, title: &str, modified: i64) -> Task {
        Task::new(id, title, t(modified))
    }

    fn tombstone(id: &str, deleted: i64) -> Tombstone {
        Tombstone::new(task(id, "gone", 0), None, t(deleted))
    }

    #[test]
    fn remote_newer_edit_wins() {
        let local = Snapshot::new().with_task(Category::Inbox, task("1", "A", 1));
        let remote = Snapshot::new().with_task(Category::Inbox, task("1", "A-edited", 2));

        let (merged, report) = merge_with_report(&local, &remote);

        assert_eq!(
            merged.categories.get(Category::Inbox),
            &[task("1", "A-edited", 2)]
        );
        assert_eq!(report.from_remote, 1);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].resolution, ConflictResolution::RemoteWins);
    }

    #[test]
    fn local_newer_edit_wins() {
        let local = Snapshot::new().with_task(Category::Priority, task("1", "mine", 5));
        let remote = Snapshot::new().with_task(Category::Inbox, task("1", "theirs", 2));

        let (merged, report) = merge_with_report(&local, &remote);

        assert_eq!(merged.get_task("1").unwrap(), (Category::Priority, &task("1", "mine", 5)));
        assert_eq!(report.conflicts[0].resolution, ConflictResolution::LocalWins);
    }

    #[test]
    fn tie_keeps_first_scanned_copy() {
        let a = Snapshot::new().with_task(Category::Inbox, task("1", "a", 3));
        let b = Snapshot::new().with_task(Category::Someday, task("1", "b", 3));

        let ab = merge(&a, &b);
        let ba = merge(&b, &a);

        assert_eq!(ab.get_task("1").unwrap(), (Category::Inbox, &task("1", "a", 3)));
        assert_eq!(ba.get_task("1").unwrap(), (Category::Someday, &task("1", "b", 3)));
    }

    #[test]
    fn tombstone_beats_newer_edit() {
        let local = Snapshot::new().with_task(Category::Inbox, task("x", "edited", 20));
        let remote = Snapshot::new().with_tombstone(tombstone("x", 10));

        let (merged, report) = merge_with_report(&local, &remote);

        assert!(merged.get_task("x").is_none());
        assert!(merged.is_deleted("x"));
        assert_eq!(report.suppressed, vec!["x".to_string()]);
    }

    #[test]
    fn local_delete_is_not_resurrected_by_remote() {
        let local = Snapshot::new().with_tombstone(tombstone("2", 30));
        let remote = Snapshot::new()
            .with_task(Category::Upcoming, task("2", "stale", 5))
            .with_task(Category::Upcoming, task("3", "other", 6));

        let merged = merge(&local, &remote);

        assert!(merged.get_task("2").is_none());
        assert!(merged.is_deleted("2"));
        assert_eq!(merged.get_task("3").unwrap().0, Category::Upcoming);
    }

    #[test]
    fn tombstone_union_prefers_later_deletion() {
        let local = [tombstone("a", 5), tombstone("b", 1)];
        let remote = [tombstone("b", 9), tombstone("c", 2), tombstone("a", 4)];

        let merged = merge_tombstones(&local, &remote);

        let ids: Vec<_> = merged.iter().map(|t| t.id().as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(merged[0].deleted_on, t(5));
        assert_eq!(merged[1].deleted_on, t(9));
    }

    #[test]
    fn orphan_tombstone_is_retained() {
        let local = Snapshot::new().with_tombstone(tombstone("ghost", 1));
        let merged = merge(&local, &Snapshot::new());
        assert_eq!(merged.tombstones.len(), 1);
        assert_eq!(merged.task_count(), 0);
    }

    #[test]
    fn categories_sorted_most_recent_first() {
        let local = Snapshot::new()
            .with_task(Category::Inbox, task("old", "", 1))
            .with_task(Category::Inbox, task("new", "", 9));
        let remote = Snapshot::new().with_task(Category::Inbox, task("mid", "", 5));

        let merged = merge(&local, &remote);
        let ids: Vec<_> = merged
            .categories
            .get(Category::Inbox)
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, ["new", "mid", "old"]);
    }

    #[test]
    fn empty_remote_filters_local_through_own_tombstones() {
        let local = Snapshot::new()
            .with_task(Category::Inbox, task("keep", "", 2))
            .with_task(Category::Inbox, task("dead", "", 3))
            .with_tombstone(tombstone("dead", 4));

        let merged = merge(&local, &Snapshot::new());

        assert_eq!(merged.categories.get(Category::Inbox), &[task("keep", "", 2)]);
        assert_eq!(merged.tombstones, local.tombstones);
        assert!(merged.last_sync.is_none());
    }

    #[test]
    fn result_carries_remote_last_sync() {
        let local = Snapshot::new().with_last_sync(Some(t(1)));
        let remote = Snapshot::new().with_last_sync(Some(t(2)));
        assert_eq!(merge(&local, &remote).last_sync, Some(t(2)));
    }

    #[test]
    fn identical_copies_are_not_conflicts() {
        let s = Snapshot::new().with_task(Category::Inbox, task("1", "A", 1));
        let (merged, report) = merge_with_report(&s, &s);
        assert_eq!(merged, s);
        assert!(report.conflicts.is_empty());
        assert_eq!(report.from_local, 1);
        assert!(!report.remote_changes());
    }
}
