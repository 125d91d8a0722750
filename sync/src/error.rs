//! Unified error handling for the sync client.

use tasklane_engine::MergeReport;

/// Failure talking to the remote blob store.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Remote rejected the access token")]
    Unauthorized,

    #[error("Remote path not found: {0}")]
    NotFound(String),

    #[error("Remote write conflict at {0}")]
    Conflict(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed remote response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}

/// Failure reading or writing the local store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Stored snapshot is invalid: {0}")]
    Snapshot(#[from] tasklane_engine::Error),
}

/// Sync-level error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Not connected to the remote store")]
    NotAuthenticated,

    #[error("Access token expired, reconnect required")]
    AuthExpired,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote snapshot does not exist yet")]
    RemoteUninitialized,

    #[error("Invalid backup: {0}")]
    InvalidBackupFormat(String),

    #[error("Engine error: {0}")]
    Engine(#[from] tasklane_engine::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Remote error: {0}")]
    Remote(RemoteError),
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unauthorized => SyncError::AuthExpired,
            RemoteError::Network(msg) => SyncError::Network(msg),
            RemoteError::NotFound(_) | RemoteError::Conflict(_) => SyncError::RemoteUninitialized,
            other => SyncError::Remote(other),
        }
    }
}

impl SyncError {
    /// Whether the caller has to reconnect before syncing again.
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::AuthExpired | SyncError::NotAuthenticated)
    }
}

/// Outcome of a full sync cycle. Never an `Err`: failures are reported
/// here and the local state stays consistent.
#[derive(Debug)]
pub enum SyncResult {
    /// Downloaded, merged and uploaded.
    Synced(MergeReport),
    /// The remote blob was missing and has been created from local state.
    Initialized,
    /// Something failed; local state holds whatever was merged before it.
    Failed(SyncError),
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, SyncResult::Failed(_))
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
