//! # Tasklane Sync
//!
//! Persistence and remote synchronization around [`tasklane_engine`].
//!
//! A [`SyncController`] owns the task repository together with a
//! [`LocalStore`] (where the snapshot and access token live) and a
//! [`RemoteStore`] (a blob store such as Dropbox). It persists every local
//! change, runs the download → merge → upload cycle, and turns remote
//! failures into [`SyncResult`]s and [`SyncEvent`]s instead of errors that
//! escape to the caller.
//!
//! ```rust
//! use tasklane_sync::{MemoryRemote, MemoryStore, SyncController};
//! use tasklane_engine::{Category, ManualClock};
//! use chrono::{TimeZone, Utc};
//! use std::collections::BTreeSet;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
//! let remote = MemoryRemote::new("token", start);
//! let (mut controller, _) = SyncController::open(
//!     MemoryStore::new(),
//!     remote.clone(),
//!     "/tareas.json",
//!     Box::new(ManualClock::new(start)),
//! )
//! .unwrap();
//!
//! controller.authenticate("token").unwrap();
//! controller
//!     .mutate(|repo| Ok(repo.add(Category::Inbox, "Call mum", BTreeSet::new(), None)))
//!     .await
//!     .unwrap();
//!
//! assert!(controller.full_sync().await.is_success());
//! assert!(remote.contents("/tareas.json").is_some());
//! # });
//! ```

pub mod auth;
pub mod config;
pub mod controller;
pub mod error;
pub mod poller;
pub mod remote;
pub mod store;

pub use config::{Config, ConfigError};
pub use controller::{Download, EventSender, SyncController, SyncEvent, SyncStatus};
pub use error::{RemoteError, StoreError, SyncError, SyncResult};
pub use poller::{spawn_poller, PollerExit, SharedController};
pub use remote::{DropboxStore, Fault, MemoryRemote, RemoteMetadata, RemoteStore};
pub use store::{load_snapshot, save_snapshot, FileStore, LocalStore, MemoryStore};
