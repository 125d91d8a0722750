//! Snapshot: the unit exchanged with the remote store and persisted locally.
//!
//! Wire format (JSON):
//!
//! ```text
//! { "formatVersion": 2,
//!   "categories": { "inbox": [ <Task>, ... ], ... },
//!   "deletedTasks": [ <Tombstone>, ... ],
//!   "lastSync": "<RFC 3339 timestamp>" | null }
//! ```
//!
//! Serialization is deterministic: categories are always written in scan
//! order and tags as sorted arrays.

use crate::clock::serde_ts;
use crate::{error::Result, Categories, Category, Error, Task, TaskId, Timestamp, Tombstone};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Version of the snapshot format for future compatibility.
///
/// Version 1 is the unversioned shape older clients wrote.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 2;

fn current_format_version() -> u32 {
    SNAPSHOT_FORMAT_VERSION
}

/// Categorized tasks, tombstones and the last-sync marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Snapshot format version
    #[serde(default = "current_format_version")]
    pub format_version: u32,
    pub categories: Categories,
    /// Deleted tasks, at most one per id
    #[serde(default, rename = "deletedTasks")]
    pub tombstones: Vec<Tombstone>,
    /// Remote modification time recorded at the last successful sync
    #[serde(default, with = "serde_ts::option")]
    pub last_sync: Option<Timestamp>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshot {
    /// Create a new empty snapshot.
    pub fn new() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            categories: Categories::new(),
            tombstones: Vec::new(),
            last_sync: None,
        }
    }

    /// Builder-style: add a task to a category.
    pub fn with_task(mut self, category: Category, task: Task) -> Self {
        self.categories.push(category, task);
        self
    }

    /// Builder-style: add a tombstone.
    pub fn with_tombstone(mut self, tombstone: Tombstone) -> Self {
        self.tombstones.push(tombstone);
        self
    }

    /// Builder-style: set the last-sync marker.
    pub fn with_last_sync(mut self, last_sync: Option<Timestamp>) -> Self {
        self.last_sync = last_sync;
        self
    }

    /// Find a live task and its category.
    pub fn get_task(&self, id: &str) -> Option<(Category, &Task)> {
        let (category, index) = self.categories.locate(id)?;
        Some((category, &self.categories.get(category)[index]))
    }

    /// Find a tombstone by task id.
    pub fn get_tombstone(&self, id: &str) -> Option<&Tombstone> {
        self.tombstones.iter().find(|t| t.id() == id)
    }

    pub fn is_deleted(&self, id: &str) -> bool {
        self.get_tombstone(id).is_some()
    }

    /// Ids of all tombstones.
    pub fn tombstone_ids(&self) -> HashSet<&TaskId> {
        self.tombstones.iter().map(Tombstone::id).collect()
    }

    /// Count of live tasks across all categories.
    pub fn task_count(&self) -> usize {
        self.categories.len()
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from canonical JSON.
    ///
    /// This is strict: every task needs an id and a `lastModified`. Blobs
    /// written by older clients go through [`crate::migrate`] instead.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(snapshot)
    }
}

/// Summary of a snapshot (without the full data), for logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub format_version: u32,
    /// Live tasks per category, in scan order
    pub task_counts: [usize; 5],
    pub tombstone_count: usize,
    #[serde(with = "serde_ts::option")]
    pub last_sync: Option<Timestamp>,
}

impl SnapshotMetadata {
    pub fn task_count(&self) -> usize {
        self.task_counts.iter().sum()
    }
}

impl From<&Snapshot> for SnapshotMetadata {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            format_version: snapshot.format_version,
            task_counts: Category::ALL.map(|c| snapshot.categories.get(c).len()),
            tombstone_count: snapshot.tombstones.len(),
            last_sync: snapshot.last_sync,
        }
    }
}

/// Serialize a snapshot as a user-facing backup file.
pub fn export_backup(snapshot: &Snapshot) -> Result<String> {
    snapshot.to_json_pretty()
}

/// Parse a backup file.
///
/// The blob must be a JSON object with a `categories` key; anything else is
/// rejected before any content is looked at. Accepted blobs go through
/// migration, so backups written by older clients restore cleanly.
pub fn import_backup(json: &str, clock: &dyn crate::Clock) -> Result<Snapshot> {
    let raw: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| Error::InvalidBackupFormat(format!("not valid JSON: {e}")))?;

    match raw.get("categories") {
        Some(categories) if categories.is_object() => {}
        Some(_) => {
            return Err(Error::InvalidBackupFormat(
                "'categories' must be an object".into(),
            ))
        }
        None => {
            return Err(Error::InvalidBackupFormat(
                "missing 'categories' key".into(),
            ))
        }
    }

    crate::migrate(&raw, clock)
        .map(|(snapshot, _)| snapshot)
        .map_err(|e| Error::InvalidBackupFormat(e.to_string()))
}
