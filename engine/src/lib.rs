//! # Tasklane Engine
//!
//! The deterministic core of a local-first personal task manager.
//!
//! This crate owns the task collection and reconciles it with a remote copy
//! that may have diverged. It has no knowledge of files, network or
//! platform: time and ids come from an injected [`Clock`], persistence and
//! transport live in the `tasklane-sync` crate.
//!
//! ## Core Concepts
//!
//! ### Tasks and categories
//!
//! Every live [`Task`] sits in exactly one of five fixed [`Category`]
//! buckets (`inbox`, `priority`, `upcoming`, `someday`, `archived`). Each
//! mutation strictly increases the task's `lastModified`.
//!
//! ### Tombstones
//!
//! Deleting a task replaces it with a [`Tombstone`]. Tombstones are never
//! garbage collected and always beat a live copy during merge, so a deleted
//! task cannot come back from a stale replica.
//!
//! ### Snapshots
//!
//! A [`Snapshot`] (categories + tombstones + last-sync marker) is the unit
//! persisted locally and exchanged with the remote store.
//!
//! ### Merge
//!
//! [`merge`] reconciles two snapshots with task-level last-write-wins,
//! tombstone precedence and a deterministic, recency-sorted output.
//!
//! ## Quick Start
//!
//! ```rust
//! use tasklane_engine::{merge, Category, ManualClock, Snapshot, TaskRepository};
//! use chrono::{TimeZone, Utc};
//! use std::collections::BTreeSet;
//!
//! let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
//! let mut repo = TaskRepository::new(Box::new(clock));
//!
//! let task = repo.add(Category::Inbox, "Water the plants", BTreeSet::new(), None);
//! repo.toggle_completion(&task.id).unwrap();
//! assert_eq!(repo.find(&task.id).unwrap().category, Category::Archived);
//!
//! // Merging with an empty remote keeps everything
//! let merged = merge(repo.snapshot(), &Snapshot::new());
//! assert_eq!(merged.task_count(), 1);
//! ```

pub mod category;
pub mod clock;
pub mod error;
pub mod merge;
pub mod migrate;
pub mod repository;
pub mod snapshot;
pub mod task;

// Re-export main types at crate root
pub use category::{Categories, Category};
pub use clock::{format_timestamp, parse_timestamp, Clock, ManualClock, SystemClock};
pub use error::Error;
pub use merge::{
    merge, merge_tombstones, merge_with_report, Conflict, ConflictResolution, MergeReport, Side,
};
pub use migrate::{migrate, MigrationReport, SourceShape};
pub use repository::{Found, Mutation, Observer, TaskRepository, TaskUpdate};
pub use snapshot::{
    export_backup, import_backup, Snapshot, SnapshotMetadata, SNAPSHOT_FORMAT_VERSION,
};
pub use task::{Task, Tombstone};

/// Type aliases for clarity
pub type TaskId = String;
pub type Timestamp = chrono::DateTime<chrono::Utc>;
