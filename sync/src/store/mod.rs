//! Local persistence of the snapshot and the access token.
//!
//! The store is a flat string key/value space. A snapshot is split over
//! several keys so older clients that only knew `categories` and
//! `deletedTasks` can still be read; everything passes through
//! [`tasklane_engine::migrate`] on load.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use serde_json::{Map, Value};
use tasklane_engine::{
    format_timestamp, migrate, Clock, MigrationReport, Snapshot, SNAPSHOT_FORMAT_VERSION,
};

/// Store keys.
pub mod keys {
    pub const CATEGORIES: &str = "categories";
    pub const DELETED_TASKS: &str = "deletedTasks";
    pub const LAST_SYNC: &str = "lastSync";
    pub const FORMAT_VERSION: &str = "formatVersion";
    pub const LAST_REV: &str = "lastRev";
    pub const ACCESS_TOKEN: &str = "accessToken";
}

/// String key/value persistence.
pub trait LocalStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// Load and migrate the persisted snapshot. An empty store yields an empty
/// snapshot.
pub fn load_snapshot<S: LocalStore + ?Sized>(
    store: &S,
    clock: &dyn Clock,
) -> Result<(Snapshot, MigrationReport), StoreError> {
    let mut raw = Map::new();

    match store.get(keys::CATEGORIES)? {
        Some(blob) => match serde_json::from_str::<Value>(&blob)? {
            // Very old clients kept a flat task list under this key
            tasks @ Value::Array(_) => raw.insert("tasks".into(), tasks),
            categories => raw.insert("categories".into(), categories),
        },
        None => {
            // Nothing stored yet: start at the current version
            raw.insert("formatVersion".into(), SNAPSHOT_FORMAT_VERSION.into());
            raw.insert("categories".into(), Value::Object(Map::new()))
        }
    };

    if let Some(blob) = store.get(keys::DELETED_TASKS)? {
        raw.insert("deletedTasks".into(), serde_json::from_str(&blob)?);
    }
    if let Some(ts) = store.get(keys::LAST_SYNC)? {
        raw.insert("lastSync".into(), Value::String(ts));
    }
    if let Some(version) = store.get(keys::FORMAT_VERSION)? {
        raw.insert("formatVersion".into(), serde_json::from_str(&version)?);
    }

    Ok(migrate(&Value::Object(raw), clock)?)
}

/// Persist every snapshot key.
///
/// Tombstones go first. If the categories write then fails, the store holds
/// a tombstone for a task that is still listed, which merge suppresses; the
/// opposite order could lose a deletion.
pub fn save_snapshot<S: LocalStore + ?Sized>(
    store: &mut S,
    snapshot: &Snapshot,
) -> Result<(), StoreError> {
    store.set(
        keys::DELETED_TASKS,
        &serde_json::to_string(&snapshot.tombstones)?,
    )?;
    store.set(
        keys::CATEGORIES,
        &serde_json::to_string(&snapshot.categories)?,
    )?;
    match snapshot.last_sync {
        Some(ts) => store.set(keys::LAST_SYNC, &format_timestamp(&ts))?,
        None => store.remove(keys::LAST_SYNC)?,
    }
    store.set(keys::FORMAT_VERSION, &snapshot.format_version.to_string())
}
