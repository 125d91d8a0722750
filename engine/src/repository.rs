//! Task repository - the in-memory state container.
//!
//! The repository owns the categorized task collection and the tombstone
//! list. Every mutation stamps `lastModified`, keeps the archive invariants
//! (`archivedOn` set exactly while archived, completing archives) and then
//! notifies registered observers, which is where persistence, re-rendering
//! and upload scheduling hook in.

use crate::{
    error::Result, Category, Clock, Error, Snapshot, Task, TaskId, Timestamp, Tombstone,
};
use std::collections::BTreeSet;
use std::fmt;

/// A successful mutation, as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Added { id: TaskId, category: Category },
    Updated { id: TaskId },
    Toggled { id: TaskId, completed: bool },
    Moved { id: TaskId, from: Category, to: Category },
    Removed { id: TaskId },
    ReminderFired { id: TaskId },
    TriggerScheduled { id: TaskId },
    /// The whole snapshot was replaced (merge or restore)
    Replaced,
}

/// Post-mutation hook.
pub type Observer = Box<dyn FnMut(&Mutation) + Send>;

/// Where a task was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Found<'a> {
    pub task: &'a Task,
    pub category: Category,
    pub index: usize,
}

/// Field changes for [`TaskRepository::update`].
///
/// The title is always rewritten; `None` leaves the other fields untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub title: String,
    pub category: Option<Category>,
    pub tags: Option<BTreeSet<String>>,
    /// `Some(None)` clears the reminder
    pub reminder_at: Option<Option<Timestamp>>,
}

impl TaskUpdate {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn reminder_at(mut self, at: Option<Timestamp>) -> Self {
        self.reminder_at = Some(at);
        self
    }
}

/// The single authoritative view of all non-deleted tasks.
pub struct TaskRepository {
    snapshot: Snapshot,
    clock: Box<dyn Clock>,
    observers: Vec<Observer>,
}

impl fmt::Debug for TaskRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRepository")
            .field("snapshot", &self.snapshot)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl TaskRepository {
    /// Create an empty repository.
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self::from_snapshot(Snapshot::new(), clock)
    }

    /// Create a repository over an existing snapshot.
    pub fn from_snapshot(snapshot: Snapshot, clock: Box<dyn Clock>) -> Self {
        Self {
            snapshot,
            clock,
            observers: Vec::new(),
        }
    }

    /// Register a post-mutation hook.
    pub fn subscribe(&mut self, observer: impl FnMut(&Mutation) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Replace the whole snapshot, e.g. with a merge result.
    pub fn replace_snapshot(&mut self, snapshot: Snapshot) {
        self.snapshot = snapshot;
        self.notify(Mutation::Replaced);
    }

    pub fn last_sync(&self) -> Option<Timestamp> {
        self.snapshot.last_sync
    }

    /// Record the remote modification time of the last successful sync.
    ///
    /// Bookkeeping only: observers are not notified.
    pub fn set_last_sync(&mut self, at: Option<Timestamp>) {
        self.snapshot.last_sync = at;
    }

    /// Find a task by id: linear scan in category order.
    pub fn find(&self, id: &str) -> Result<Found<'_>> {
        let (category, index) = self
            .snapshot
            .categories
            .locate(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        Ok(Found {
            task: &self.snapshot.categories.get(category)[index],
            category,
            index,
        })
    }

    /// Tasks in a category, in stored order.
    pub fn tasks(&self, category: Category) -> &[Task] {
        self.snapshot.categories.get(category)
    }

    /// Create a task with a fresh id and append it to `category`.
    pub fn add(
        &mut self,
        category: Category,
        title: impl Into<String>,
        tags: BTreeSet<String>,
        reminder_at: Option<Timestamp>,
    ) -> Task {
        let id = self.fresh_id();
        let now = self.clock.now();
        let mut task = Task::new(id, title, now);
        task.tags = tags;
        task.reminder_at = reminder_at;
        if category.is_archived() {
            enter_archive(&mut task, now);
        }

        self.snapshot.categories.push(category, task.clone());
        self.notify(Mutation::Added {
            id: task.id.clone(),
            category,
        });
        task
    }

    /// Edit a task in place, relocating it when the category changes.
    ///
    /// A changed reminder time re-arms the reminder: `reminderDone` and the
    /// scheduled-trigger marker are reset.
    pub fn update(&mut self, id: &str, update: TaskUpdate) -> Result<()> {
        let (from, index) = self.locate(id)?;
        let now = self.clock.now();

        let task = &mut self.snapshot.categories.get_mut(from)[index];
        task.title = update.title;
        if let Some(tags) = update.tags {
            task.tags = tags;
        }
        if let Some(reminder_at) = update.reminder_at {
            if reminder_at != task.reminder_at {
                task.reminder_done = false;
                task.trigger_scheduled_at = None;
            }
            task.reminder_at = reminder_at;
        }
        task.touch(now);

        if let Some(to) = update.category.filter(|to| *to != from) {
            self.relocate(from, index, to, now);
        }

        self.notify(Mutation::Updated { id: id.to_string() });
        Ok(())
    }

    /// Flip completion. Completing archives the task; un-completing an
    /// archived task returns it to the inbox. Returns the new state.
    pub fn toggle_completion(&mut self, id: &str) -> Result<bool> {
        let (from, index) = self.locate(id)?;
        let now = self.clock.now();

        let task = &mut self.snapshot.categories.get_mut(from)[index];
        task.completed = !task.completed;
        task.touch(now);
        let completed = task.completed;

        if completed && !from.is_archived() {
            self.relocate(from, index, Category::Archived, now);
        } else if !completed && from.is_archived() {
            self.relocate(from, index, Category::Inbox, now);
        }

        self.notify(Mutation::Toggled {
            id: id.to_string(),
            completed,
        });
        Ok(completed)
    }

    /// Move a task to another category.
    ///
    /// Entering `archived` completes the task and suppresses its reminder;
    /// leaving it clears completion and `archivedOn`. Moving to the current
    /// category only re-appends it and stamps `lastModified`.
    pub fn move_task(&mut self, id: &str, to: Category) -> Result<()> {
        let (from, index) = self.locate(id)?;
        let now = self.clock.now();

        self.snapshot.categories.get_mut(from)[index].touch(now);
        self.relocate(from, index, to, now);

        self.notify(Mutation::Moved {
            id: id.to_string(),
            from,
            to,
        });
        Ok(())
    }

    /// Delete a task, leaving a tombstone built from its final state.
    pub fn remove(&mut self, id: &str) -> Result<Tombstone> {
        let (category, index) = self.locate(id)?;
        let task = self.snapshot.categories.get_mut(category).remove(index);
        let tombstone = Tombstone::new(task, Some(category), self.clock.now());

        self.snapshot.tombstones.push(tombstone.clone());
        self.notify(Mutation::Removed { id: id.to_string() });
        Ok(tombstone)
    }

    /// Tasks whose reminder is due at `now` and has not fired.
    pub fn due_reminders(&self, now: Timestamp) -> Vec<(Category, &Task)> {
        self.snapshot
            .categories
            .iter()
            .filter(|(_, t)| t.reminder_due(now))
            .collect()
    }

    /// Record that an external scheduler fired a task's reminder.
    pub fn mark_reminder_fired(&mut self, id: &str) -> Result<()> {
        let now = self.clock.now();
        let task = self.task_mut(id)?;
        task.reminder_done = true;
        task.touch(now);

        self.notify(Mutation::ReminderFired { id: id.to_string() });
        Ok(())
    }

    /// Record that a platform trigger was scheduled for a task's reminder.
    pub fn mark_trigger_scheduled(&mut self, id: &str, at: Timestamp) -> Result<()> {
        let now = self.clock.now();
        let task = self.task_mut(id)?;
        task.trigger_scheduled_at = Some(at);
        task.touch(now);

        self.notify(Mutation::TriggerScheduled { id: id.to_string() });
        Ok(())
    }

    /// Every tag in use, sorted.
    pub fn all_tags(&self) -> BTreeSet<String> {
        self.snapshot
            .categories
            .iter()
            .flat_map(|(_, t)| t.tags.iter().cloned())
            .collect()
    }

    /// Tasks carrying `tag`, in scan order.
    pub fn tasks_with_tag(&self, tag: &str) -> Vec<(Category, &Task)> {
        self.snapshot
            .categories
            .iter()
            .filter(|(_, t)| t.has_tag(tag))
            .collect()
    }

    fn locate(&self, id: &str) -> Result<(Category, usize)> {
        self.snapshot
            .categories
            .locate(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut Task> {
        let (category, index) = self.locate(id)?;
        Ok(&mut self.snapshot.categories.get_mut(category)[index])
    }

    /// Ids must be unique across live tasks and tombstones.
    fn fresh_id(&self) -> TaskId {
        loop {
            let id = self.clock.new_id();
            if !self.snapshot.categories.contains(&id) && !self.snapshot.is_deleted(&id) {
                return id;
            }
        }
    }

    /// Move the task at `(from, index)` to the end of `to`, applying the
    /// archive enter/exit rules.
    fn relocate(&mut self, from: Category, index: usize, to: Category, now: Timestamp) {
        let mut task = self.snapshot.categories.get_mut(from).remove(index);
        if to.is_archived() && !from.is_archived() {
            enter_archive(&mut task, now);
        } else if from.is_archived() && !to.is_archived() {
            task.completed = false;
            task.archived_on = None;
        }
        self.snapshot.categories.push(to, task);
    }

    fn notify(&mut self, mutation: Mutation) {
        for observer in &mut self.observers {
            observer(&mutation);
        }
    }
}

fn enter_archive(task: &mut Task, now: Timestamp) {
    task.completed = true;
    task.archived_on = Some(now);
    task.reminder_done = true;
}
