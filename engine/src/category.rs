//! The five fixed task categories and the collection that holds them.

use crate::{Error, Task, TaskId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One of the five fixed buckets a task can occupy.
///
/// The set is closed: categories are never created or destroyed, tasks only
/// move between them. Declaration order is the canonical scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[serde(alias = "bandeja-de-entrada", alias = "bandejaDeEntrada")]
    Inbox,
    #[serde(alias = "prioritaria")]
    Priority,
    #[serde(alias = "proximas")]
    Upcoming,
    #[serde(alias = "algun-dia", alias = "algunDia")]
    Someday,
    #[serde(alias = "archivadas")]
    Archived,
}

impl Category {
    /// All categories in scan order.
    pub const ALL: [Category; 5] = [
        Category::Inbox,
        Category::Priority,
        Category::Upcoming,
        Category::Someday,
        Category::Archived,
    ];

    /// Wire key for this category.
    pub fn key(self) -> &'static str {
        match self {
            Category::Inbox => "inbox",
            Category::Priority => "priority",
            Category::Upcoming => "upcoming",
            Category::Someday => "someday",
            Category::Archived => "archived",
        }
    }

    /// Resolve a wire key, including the keys older clients wrote.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "inbox" | "bandeja-de-entrada" | "bandejaDeEntrada" => Some(Category::Inbox),
            "priority" | "prioritaria" => Some(Category::Priority),
            "upcoming" | "proximas" => Some(Category::Upcoming),
            "someday" | "algun-dia" | "algunDia" => Some(Category::Someday),
            "archived" | "archivadas" => Some(Category::Archived),
            _ => None,
        }
    }

    pub fn is_archived(self) -> bool {
        self == Category::Archived
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::from_key(s).ok_or_else(|| Error::InvalidCategory(s.to_string()))
    }
}

/// Ordered task sequences, one per category.
///
/// Serialized as a JSON object keyed by category in scan order. Every
/// category is always present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Categories {
    lists: [Vec<Task>; 5],
}

impl Categories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks in a category.
    pub fn get(&self, category: Category) -> &[Task] {
        &self.lists[category.index()]
    }

    /// Mutable task sequence for a category.
    pub fn get_mut(&mut self, category: Category) -> &mut Vec<Task> {
        &mut self.lists[category.index()]
    }

    /// Append a task to a category.
    pub fn push(&mut self, category: Category, task: Task) {
        self.get_mut(category).push(task);
    }

    /// Iterate over every task with its category, in scan order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &Task)> {
        Category::ALL
            .into_iter()
            .flat_map(move |c| self.get(c).iter().map(move |t| (c, t)))
    }

    /// Locate a task by id: first match in scan order.
    pub fn locate(&self, id: &str) -> Option<(Category, usize)> {
        Category::ALL.into_iter().find_map(|c| {
            self.get(c)
                .iter()
                .position(|t| t.id == id)
                .map(|index| (c, index))
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.locate(id).is_some()
    }

    /// Ids of every task, in scan order.
    pub fn ids(&self) -> impl Iterator<Item = &TaskId> {
        self.iter().map(|(_, t)| &t.id)
    }

    /// Total number of tasks across all categories.
    pub fn len(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for Categories {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(Category::ALL.iter().map(|c| (c.key(), self.get(*c))))
    }
}

impl<'de> Deserialize<'de> for Categories {
    /// Unknown category keys are dropped along with their tasks.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Vec<Task>>::deserialize(deserializer)?;
        let mut categories = Categories::new();
        for (key, tasks) in raw {
            if let Some(category) = Category::from_key(&key) {
                categories.get_mut(category).extend(tasks);
            }
        }
        Ok(categories)
    }
}
