//! One-time upward migration of stored or downloaded blobs.
//!
//! Older clients wrote loosely typed JSON: tasks without ids or
//! `lastModified`, the title under `task`, Spanish category keys, and at
//! times a flat `tasks` array instead of a category map. [`migrate`] turns
//! any of those shapes into a well-formed [`Snapshot`].
//!
//! Defaulting rules:
//! - missing or empty `id` → fresh id from the clock
//! - missing `lastModified` → `archivedOn` if present, else `now`
//! - unparseable timestamps count as missing
//! - a task in `archived` without `archivedOn` gets `archivedOn = lastModified`
//! - a task outside `archived` has `archivedOn` cleared
//! - a tombstone without `deletedOn` gets its `lastModified`
//! - a repeated task id keeps its first occurrence

use crate::{
    clock::parse_timestamp, error::Result, Category, Clock, Error, Snapshot, Task, Timestamp,
    Tombstone, SNAPSHOT_FORMAT_VERSION,
};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Which stored layout a blob was recognised as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceShape {
    /// `{ "categories": {...}, "deletedTasks": [...], "lastSync": ... }`
    Categorized,
    /// `{ "tasks": [ {..., "category": "bandejaDeEntrada"} ], ... }`
    FlatTasks,
    /// The category map itself at top level.
    BareCategories,
}

/// What a migration pass changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub shape: SourceShape,
    /// Format version the blob declared (1 when absent)
    pub source_version: u32,
    pub generated_ids: usize,
    pub defaulted_timestamps: usize,
    /// Entries that were not objects, sat under unknown keys, or repeated an id
    pub dropped: usize,
    pub normalized_archive: usize,
}

impl MigrationReport {
    fn new(shape: SourceShape, source_version: u32) -> Self {
        Self {
            shape,
            source_version,
            generated_ids: 0,
            defaulted_timestamps: 0,
            dropped: 0,
            normalized_archive: 0,
        }
    }

    /// Whether migration had to rewrite anything.
    pub fn changed(&self) -> bool {
        self.source_version < SNAPSHOT_FORMAT_VERSION
            || self.generated_ids > 0
            || self.defaulted_timestamps > 0
            || self.dropped > 0
            || self.normalized_archive > 0
    }
}

/// Migrate a raw JSON blob into a snapshot.
pub fn migrate(raw: &Value, clock: &dyn Clock) -> Result<(Snapshot, MigrationReport)> {
    let obj = raw
        .as_object()
        .ok_or_else(|| Error::InvalidSnapshot("expected a JSON object".into()))?;

    let source_version = match obj.get("formatVersion") {
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| Error::InvalidSnapshot("formatVersion must be an integer".into()))?,
        None => 1,
    };
    if source_version > SNAPSHOT_FORMAT_VERSION {
        return Err(Error::InvalidSnapshot(format!(
            "unsupported snapshot format version: {} (max supported: {})",
            source_version, SNAPSHOT_FORMAT_VERSION
        )));
    }

    let mut migrator = Migrator {
        clock,
        now: clock.now(),
        seen: HashSet::new(),
        report: MigrationReport::new(SourceShape::Categorized, source_version),
        snapshot: Snapshot::new(),
    };

    if let Some(Value::Object(categories)) = obj.get("categories") {
        migrator.categories(categories);
    } else if let Some(Value::Array(tasks)) = obj.get("tasks") {
        migrator.report.shape = SourceShape::FlatTasks;
        migrator.flat_tasks(tasks);
    } else if obj.keys().any(|k| Category::from_key(k).is_some()) {
        migrator.report.shape = SourceShape::BareCategories;
        migrator.categories(obj);
    } else {
        return Err(Error::InvalidSnapshot(
            "no 'categories', 'tasks' or category keys found".into(),
        ));
    }

    if let Some(Value::Array(deleted)) = obj.get("deletedTasks") {
        migrator.tombstones(deleted);
    }

    migrator.snapshot.last_sync = obj.get("lastSync").and_then(timestamp_value);

    Ok((migrator.snapshot, migrator.report))
}

/// Top-level keys of the snapshot wrapper, never category names.
const RESERVED_KEYS: [&str; 3] = ["deletedTasks", "lastSync", "formatVersion"];

struct Migrator<'a> {
    clock: &'a dyn Clock,
    now: Timestamp,
    seen: HashSet<String>,
    report: MigrationReport,
    snapshot: Snapshot,
}

impl Migrator<'_> {
    /// Walk a category map in scan order so id generation and duplicate
    /// resolution do not depend on key spelling.
    fn categories(&mut self, map: &Map<String, Value>) {
        for category in Category::ALL {
            for (key, tasks) in map {
                if Category::from_key(key) != Some(category) {
                    continue;
                }
                let Value::Array(tasks) = tasks else {
                    continue;
                };
                for raw in tasks {
                    self.live_task(raw, category);
                }
            }
        }

        for (key, tasks) in map {
            if Category::from_key(key).is_some() || RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if let Value::Array(tasks) = tasks {
                self.report.dropped += tasks.len();
            }
        }
    }

    fn flat_tasks(&mut self, tasks: &[Value]) {
        for raw in tasks {
            let category = raw
                .get("category")
                .and_then(Value::as_str)
                .and_then(Category::from_key)
                .unwrap_or(Category::Inbox);
            self.live_task(raw, category);
        }
    }

    fn live_task(&mut self, raw: &Value, category: Category) {
        let Some(mut task) = self.task(raw) else {
            self.report.dropped += 1;
            return;
        };
        if !self.seen.insert(task.id.clone()) {
            self.report.dropped += 1;
            return;
        }

        match (category.is_archived(), task.archived_on) {
            (true, None) => {
                task.archived_on = Some(task.last_modified);
                self.report.normalized_archive += 1;
            }
            (false, Some(_)) => {
                task.archived_on = None;
                self.report.normalized_archive += 1;
            }
            _ => {}
        }

        self.snapshot.categories.push(category, task);
    }

    fn tombstones(&mut self, deleted: &[Value]) {
        let mut by_id: HashMap<String, usize> = HashMap::new();
        for raw in deleted {
            let Some(task) = self.task(raw) else {
                self.report.dropped += 1;
                continue;
            };
            let deleted_on = raw
                .get("deletedOn")
                .and_then(timestamp_value)
                .unwrap_or(task.last_modified);
            let category = raw
                .get("category")
                .and_then(Value::as_str)
                .and_then(Category::from_key);
            let tombstone = Tombstone::new(task, category, deleted_on);

            match by_id.get(tombstone.id()) {
                Some(&i) => {
                    self.report.dropped += 1;
                    if tombstone.deleted_on > self.snapshot.tombstones[i].deleted_on {
                        self.snapshot.tombstones[i] = tombstone;
                    }
                }
                None => {
                    by_id.insert(tombstone.id().clone(), self.snapshot.tombstones.len());
                    self.snapshot.tombstones.push(tombstone);
                }
            }
        }
    }

    fn task(&mut self, raw: &Value) -> Option<Task> {
        let obj = raw.as_object()?;

        let id = match obj.get("id").or_else(|| obj.get("taskId")) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                self.report.generated_ids += 1;
                self.clock.new_id()
            }
        };

        let title = ["title", "task"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .unwrap_or_default();

        let archived_on = obj.get("archivedOn").and_then(timestamp_value);
        let last_modified = match obj.get("lastModified").and_then(timestamp_value) {
            Some(ts) => ts,
            None => {
                self.report.defaulted_timestamps += 1;
                archived_on.unwrap_or(self.now)
            }
        };

        let mut task = Task::new(id, title, last_modified);
        task.completed = obj.get("completed").and_then(Value::as_bool).unwrap_or(false);
        task.tags = match obj.get("tags") {
            Some(Value::Array(tags)) => tags
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Default::default(),
        };
        task.reminder_at = ["reminderAt", "reminder"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(timestamp_value));
        task.reminder_done = obj
            .get("reminderDone")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        task.trigger_scheduled_at = obj.get("triggerScheduledAt").and_then(timestamp_value);
        task.archived_on = archived_on;

        Some(task)
    }
}

/// Read a timestamp stored either as an RFC 3339 string or as epoch millis.
fn timestamp_value(value: &Value) -> Option<Timestamp> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}
