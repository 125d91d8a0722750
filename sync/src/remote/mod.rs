//! Remote blob store abstraction.
//!
//! The sync controller only needs three calls against a single path:
//! metadata, download and an overwriting upload. [`DropboxStore`] talks to
//! the Dropbox HTTP API; [`MemoryRemote`] keeps the blob in memory.

mod dropbox;
mod memory;

pub use dropbox::DropboxStore;
pub use memory::{Fault, MemoryRemote};

use crate::error::RemoteError;
use async_trait::async_trait;
use tasklane_engine::Timestamp;

/// What the store reports about a blob without fetching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub path: String,
    /// Server-assigned modification time
    pub modified_at: Timestamp,
    pub size: Option<u64>,
    pub rev: Option<String>,
}

/// A bearer-authenticated blob store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get_metadata(&self, token: &str, path: &str) -> Result<RemoteMetadata, RemoteError>;

    async fn download(&self, token: &str, path: &str) -> Result<Vec<u8>, RemoteError>;

    /// Overwrite the blob at `path`.
    async fn upload(
        &self,
        token: &str,
        path: &str,
        body: Vec<u8>,
    ) -> Result<RemoteMetadata, RemoteError>;
}
