//! Task and tombstone types.

use crate::clock::serde_ts;
use crate::{Category, TaskId, Timestamp};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single task.
///
/// The category a task lives in is positional: it is the key of the
/// [`Categories`](crate::Categories) sequence holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Immutable, globally unique identifier
    pub id: TaskId,
    /// Task text (older clients wrote it as `task`)
    #[serde(default, alias = "task")]
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// When an external scheduler should fire a reminder
    #[serde(default, with = "serde_ts::option")]
    pub reminder_at: Option<Timestamp>,
    /// The reminder already fired (or was suppressed by archiving)
    #[serde(default)]
    pub reminder_done: bool,
    /// When a platform trigger was scheduled for the reminder
    #[serde(default, with = "serde_ts::option")]
    pub trigger_scheduled_at: Option<Timestamp>,
    /// Set exactly while the task lives in the archived category
    #[serde(default, with = "serde_ts::option")]
    pub archived_on: Option<Timestamp>,
    /// Strictly increases with every mutation
    #[serde(with = "serde_ts")]
    pub last_modified: Timestamp,
}

impl Task {
    /// Create an uncompleted, untagged task.
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            completed: false,
            tags: BTreeSet::new(),
            reminder_at: None,
            reminder_done: false,
            trigger_scheduled_at: None,
            archived_on: None,
            last_modified: now,
        }
    }

    /// Builder-style tag setter.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style reminder setter.
    pub fn with_reminder(mut self, at: Option<Timestamp>) -> Self {
        self.reminder_at = at;
        self
    }

    /// Record a mutation at `now`.
    ///
    /// `lastModified` must strictly increase even if the wall clock stalls or
    /// steps backwards, so a stale `now` advances it by one millisecond.
    pub fn touch(&mut self, now: Timestamp) {
        self.last_modified = if now > self.last_modified {
            now
        } else {
            self.last_modified + Duration::milliseconds(1)
        };
    }

    /// Whether a reminder is due at `now` and has not fired yet.
    pub fn reminder_due(&self, now: Timestamp) -> bool {
        !self.completed && !self.reminder_done && self.reminder_at.is_some_and(|at| at <= now)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Durable record that a task id was deleted.
///
/// Carries the task's last known fields for auditing. Tombstones are never
/// mutated and take precedence over any live copy of the task during merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    #[serde(flatten)]
    pub task: Task,
    #[serde(with = "serde_ts")]
    pub deleted_on: Timestamp,
    /// Category the task lived in when it was deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

impl Tombstone {
    /// Build a tombstone from a task's final state.
    pub fn new(task: Task, category: Option<Category>, deleted_on: Timestamp) -> Self {
        Self {
            task,
            deleted_on,
            category,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.task.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn create_task() {
        let task = Task::new("task-1", "Buy milk", t0()).with_tags(["home", "errands"]);

        assert_eq!(task.id, "task-1");
        assert_eq!(task.title, "Buy milk");
        assert!(!task.completed);
        assert!(task.has_tag("home"));
        assert_eq!(task.last_modified, t0());
        assert!(task.archived_on.is_none());
    }

    #[test]
    fn touch_is_strictly_monotonic() {
        let mut task = Task::new("task-1", "A", t0());

        task.touch(t0() + Duration::seconds(5));
        assert_eq!(task.last_modified, t0() + Duration::seconds(5));

        // Clock went backwards
        task.touch(t0());
        assert_eq!(
            task.last_modified,
            t0() + Duration::seconds(5) + Duration::milliseconds(1)
        );

        // Clock stalled
        let before = task.last_modified;
        task.touch(before);
        assert!(task.last_modified > before);
    }

    #[test]
    fn reminder_due() {
        let task = Task::new("task-1", "A", t0()).with_reminder(Some(t0()));
        assert!(task.reminder_due(t0()));
        assert!(!task.reminder_due(t0() - Duration::seconds(1)));

        let mut done = task.clone();
        done.reminder_done = true;
        assert!(!done.reminder_due(t0()));

        let mut completed = task;
        completed.completed = true;
        assert!(!completed.reminder_due(t0()));
    }

    #[test]
    fn serialization_format() {
        let task = Task::new("task-1", "A", t0()).with_tags(["b", "a"]);
        let json = serde_json::to_value(&task).unwrap();

        assert_eq!(json["lastModified"], "2024-03-01T10:00:00.000Z");
        assert_eq!(json["reminderAt"], serde_json::Value::Null);
        assert_eq!(json["tags"], serde_json::json!(["a", "b"]));
        assert!(json.get("category").is_none());
    }

    #[test]
    fn deserialize_legacy_title_field() {
        let json = r#"{"id": "x", "task": "Old title", "lastModified": "2024-03-01T10:00:00.000Z"}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.title, "Old title");
        assert!(task.tags.is_empty());
    }

    #[test]
    fn tombstone_flattens_task_fields() {
        let tomb = Tombstone::new(
            Task::new("task-1", "A", t0()),
            Some(Category::Inbox),
            t0() + Duration::seconds(1),
        );
        let json = serde_json::to_value(&tomb).unwrap();

        assert_eq!(json["id"], "task-1");
        assert_eq!(json["title"], "A");
        assert_eq!(json["deletedOn"], "2024-03-01T10:00:01.000Z");
        assert_eq!(json["category"], "inbox");

        let parsed: Tombstone = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, tomb);
    }
}
