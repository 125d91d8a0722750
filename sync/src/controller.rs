//! The sync state owner.
//!
//! [`SyncController`] holds the repository, both stores and the auth
//! state, and drives the download → merge → upload cycle. Every failure is
//! recovered here: callers get a [`SyncResult`] or a [`SyncError`] and the
//! local snapshot is always left persisted and internally consistent.

use crate::auth::Auth;
use crate::error::{RemoteError, Result, StoreError, SyncError, SyncResult};
use crate::remote::{RemoteMetadata, RemoteStore};
use crate::store::{keys, load_snapshot, save_snapshot, LocalStore};
use tasklane_engine::{
    export_backup, import_backup, merge_with_report, migrate, Clock, Error as EngineError,
    MergeReport, MigrationReport, Snapshot, TaskRepository, Timestamp,
};
use tokio::sync::{mpsc, watch};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Unauthenticated,
    Authenticated,
    Syncing,
}

/// User-visible notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Remote changes were merged into local state
    Merged(MergeReport),
    /// Local state was written to the remote
    Uploaded { modified_at: Timestamp },
    /// The token was rejected and has been discarded
    ReconnectRequired,
    /// A transient failure, safe to retry
    Failed(String),
}

/// Sender half for [`SyncEvent`]s.
pub type EventSender = mpsc::UnboundedSender<SyncEvent>;

/// Result of [`SyncController::download_snapshot`].
#[derive(Debug)]
pub enum Download {
    Fetched {
        snapshot: Snapshot,
        metadata: RemoteMetadata,
    },
    /// The remote has not changed since the last sync.
    NotModified,
    /// The remote blob was missing and has been created from local state.
    Initialized(RemoteMetadata),
}

pub struct SyncController<L, R> {
    repo: TaskRepository,
    local: L,
    remote: R,
    path: String,
    auth: Auth,
    status: watch::Sender<SyncStatus>,
    /// Revision of the remote blob as of `lastSync`
    last_rev: Option<String>,
    events: Option<EventSender>,
}

impl<L: LocalStore, R: RemoteStore> std::fmt::Debug for SyncController<L, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncController")
            .field("path", &self.path)
            .field("status", &self.status())
            .field("tasks", &self.repo.snapshot().task_count())
            .finish()
    }
}

impl<L: LocalStore, R: RemoteStore> SyncController<L, R> {
    /// Load the persisted snapshot and token from `local`.
    ///
    /// When migration had to rewrite the stored blobs, the migrated snapshot
    /// is written back straight away.
    pub fn open(
        mut local: L,
        remote: R,
        path: impl Into<String>,
        clock: Box<dyn Clock>,
    ) -> std::result::Result<(Self, MigrationReport), StoreError> {
        let (snapshot, report) = load_snapshot(&local, clock.as_ref())?;
        if report.changed() {
            tracing::info!(
                shape = ?report.shape,
                from_version = report.source_version,
                generated_ids = report.generated_ids,
                "Migrated stored snapshot"
            );
            save_snapshot(&mut local, &snapshot)?;
        }

        let auth = Auth::load(&local)?;
        let last_rev = local.get(keys::LAST_REV)?;
        let status = if auth.is_authenticated() {
            SyncStatus::Authenticated
        } else {
            SyncStatus::Unauthenticated
        };

        let controller = Self {
            repo: TaskRepository::from_snapshot(snapshot, clock),
            local,
            remote,
            path: path.into(),
            auth,
            status: watch::channel(status).0,
            last_rev,
            events: None,
        };
        Ok((controller, report))
    }

    /// Start receiving [`SyncEvent`]s. Replaces any earlier receiver.
    pub fn events(&mut self) -> mpsc::UnboundedReceiver<SyncEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    pub fn repository(&self) -> &TaskRepository {
        &self.repo
    }

    /// Mutable access for observers; mutations should go through
    /// [`mutate`](Self::mutate) so they get persisted.
    pub fn repository_mut(&mut self) -> &mut TaskRepository {
        &mut self.repo
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Follow status changes, including the `Syncing` phase of background
    /// pulls.
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    // ========================================================================
    // Auth
    // ========================================================================

    /// Accept a token from the OAuth redirect. A blank token leaves the
    /// controller disconnected.
    pub fn authenticate(&mut self, token: impl Into<String>) -> Result<()> {
        self.auth.set(&mut self.local, token)?;
        if !self.auth.is_authenticated() {
            self.set_status(SyncStatus::Unauthenticated);
            return Err(SyncError::NotAuthenticated);
        }
        self.set_status(SyncStatus::Authenticated);
        tracing::info!("Connected to remote store");
        Ok(())
    }

    /// Drop the token. Local tasks are kept.
    pub fn logout(&mut self) -> Result<()> {
        self.auth.clear(&mut self.local)?;
        self.set_status(SyncStatus::Unauthenticated);
        tracing::info!("Disconnected from remote store");
        Ok(())
    }

    fn token(&self) -> Result<String> {
        self.auth
            .token()
            .map(str::to_owned)
            .ok_or(SyncError::NotAuthenticated)
    }

    // ========================================================================
    // Local mutations
    // ========================================================================

    /// Run a repository operation, persist, and push the result when
    /// connected. A failed push is reported through events only: the local
    /// change stands. A failed persist undoes the change in memory.
    pub async fn mutate<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TaskRepository) -> tasklane_engine::error::Result<T>,
    {
        let before = self.repo.snapshot().clone();
        let out = f(&mut self.repo)?;
        if let Err(e) = self.persist() {
            tracing::error!(error = %e, "Failed to persist local change, rolling back");
            self.repo.replace_snapshot(before);
            if let Err(restore) = self.persist() {
                tracing::warn!(error = %restore, "Failed to restore previous snapshot on disk");
            }
            return Err(e);
        }

        if self.auth.is_authenticated() {
            if let Err(e) = self.upload_snapshot().await {
                tracing::warn!(error = %e, "Upload after local change failed");
            }
        }
        Ok(out)
    }

    /// Replace local state with a backup file. Nothing is applied when the
    /// file is rejected.
    pub async fn restore_backup(&mut self, json: &str) -> Result<()> {
        let snapshot = import_backup(json, self.repo.clock()).map_err(|e| match e {
            EngineError::InvalidBackupFormat(msg) => SyncError::InvalidBackupFormat(msg),
            other => SyncError::Engine(other),
        })?;
        let restored = snapshot.task_count();

        self.mutate(move |repo| {
            repo.replace_snapshot(snapshot);
            Ok(())
        })
        .await?;
        tracing::info!(tasks = restored, "Restored backup");
        Ok(())
    }

    pub fn export_backup(&self) -> Result<String> {
        Ok(export_backup(self.repo.snapshot())?)
    }

    fn persist(&mut self) -> Result<()> {
        save_snapshot(&mut self.local, self.repo.snapshot())?;
        Ok(())
    }

    // ========================================================================
    // Remote operations
    // ========================================================================

    /// Overwrite the remote blob with local state and record the
    /// server-assigned modification time as `lastSync`.
    pub async fn upload_snapshot(&mut self) -> Result<RemoteMetadata> {
        let token = self.token()?;
        let now = self.repo.clock().now();
        let body = self
            .repo
            .snapshot()
            .clone()
            .with_last_sync(Some(now))
            .to_json()?
            .into_bytes();

        let metadata = match self.remote.upload(&token, &self.path, body.clone()).await {
            Ok(metadata) => metadata,
            // No usable remote blob: overwrite it with local state once more
            Err(RemoteError::Conflict(reason)) => {
                tracing::warn!(path = %self.path, %reason, "Upload conflicted, overwriting remote");
                match self.remote.upload(&token, &self.path, body).await {
                    Ok(metadata) => metadata,
                    Err(e) => return Err(self.fail(e)),
                }
            }
            Err(e) => return Err(self.fail(e)),
        };

        self.repo.set_last_sync(Some(metadata.modified_at));
        self.persist()?;
        self.record_rev(&metadata)?;
        tracing::info!(path = %self.path, modified_at = %metadata.modified_at, "Uploaded snapshot");
        self.emit(SyncEvent::Uploaded {
            modified_at: metadata.modified_at,
        });
        Ok(metadata)
    }

    /// Fetch the remote snapshot. Unless `force` is set, the body is only
    /// fetched when the remote changed after the last sync. A missing
    /// remote blob is created from local state.
    pub async fn download_snapshot(&mut self, force: bool) -> Result<Download> {
        let token = self.token()?;

        let metadata = match self.remote.get_metadata(&token, &self.path).await {
            Ok(metadata) => metadata,
            Err(RemoteError::NotFound(_)) | Err(RemoteError::Conflict(_)) => {
                return self.initialize().await
            }
            Err(e) => return Err(self.fail(e)),
        };

        if !force && self.unchanged(&metadata) {
            tracing::debug!(modified_at = %metadata.modified_at, "Remote not modified");
            return Ok(Download::NotModified);
        }

        let bytes = match self.remote.download(&token, &self.path).await {
            Ok(bytes) => bytes,
            Err(RemoteError::NotFound(_)) | Err(RemoteError::Conflict(_)) => {
                return self.initialize().await
            }
            Err(e) => return Err(self.fail(e)),
        };

        match self.parse_remote(&bytes) {
            Ok(snapshot) => Ok(Download::Fetched { snapshot, metadata }),
            Err(e) => {
                tracing::error!(error = %e, "Remote snapshot is unreadable");
                self.emit(SyncEvent::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Download (when changed), merge and persist. No upload.
    ///
    /// Returns the merge report, or `None` when there was nothing to merge.
    pub async fn pull(&mut self, force: bool) -> Result<Option<MergeReport>> {
        if self.auth.is_authenticated() {
            self.set_status(SyncStatus::Syncing);
        }
        let result = self.run_pull(force).await;
        self.settle_status();
        result
    }

    async fn run_pull(&mut self, force: bool) -> Result<Option<MergeReport>> {
        match self.download_snapshot(force).await? {
            Download::Fetched { snapshot, metadata } => {
                Ok(Some(self.apply_remote(snapshot, &metadata)?))
            }
            Download::NotModified | Download::Initialized(_) => Ok(None),
        }
    }

    /// Forced download, merge, persist, then upload the merged snapshot so
    /// both sides converge. A failed upload does not undo the merge.
    pub async fn full_sync(&mut self) -> SyncResult {
        if !self.auth.is_authenticated() {
            return SyncResult::Failed(SyncError::NotAuthenticated);
        }

        self.set_status(SyncStatus::Syncing);
        tracing::info!(path = %self.path, "Starting full sync");
        let result = self.run_full_sync().await;
        self.settle_status();

        match result {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "Full sync failed");
                SyncResult::Failed(e)
            }
        }
    }

    async fn run_full_sync(&mut self) -> Result<SyncResult> {
        let report = match self.download_snapshot(true).await? {
            Download::Initialized(_) => return Ok(SyncResult::Initialized),
            Download::NotModified => MergeReport::default(),
            Download::Fetched { snapshot, metadata } => self.apply_remote(snapshot, &metadata)?,
        };
        self.upload_snapshot().await?;
        Ok(SyncResult::Synced(report))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn set_status(&self, status: SyncStatus) {
        self.status.send_replace(status);
    }

    /// Leave `Syncing` for whatever the token now allows.
    fn settle_status(&self) {
        self.set_status(if self.auth.is_authenticated() {
            SyncStatus::Authenticated
        } else {
            SyncStatus::Unauthenticated
        });
    }

    /// Whether the remote blob is the one already merged. Timestamps have
    /// one-second resolution, so equal times fall back to the revision.
    fn unchanged(&self, metadata: &RemoteMetadata) -> bool {
        let Some(last) = self.repo.last_sync() else {
            return false;
        };
        if metadata.modified_at != last {
            return metadata.modified_at < last;
        }
        match (&metadata.rev, &self.last_rev) {
            (Some(rev), Some(seen)) => rev == seen,
            _ => true,
        }
    }

    fn record_rev(&mut self, metadata: &RemoteMetadata) -> Result<()> {
        match &metadata.rev {
            Some(rev) => self.local.set(keys::LAST_REV, rev)?,
            None => self.local.remove(keys::LAST_REV)?,
        }
        self.last_rev = metadata.rev.clone();
        Ok(())
    }

    async fn initialize(&mut self) -> Result<Download> {
        tracing::info!(path = %self.path, "Remote snapshot missing, initializing from local state");
        let metadata = self.upload_snapshot().await?;
        Ok(Download::Initialized(metadata))
    }

    /// Remote blobs may come from older clients, so they are migrated
    /// rather than parsed strictly.
    fn parse_remote(&self, bytes: &[u8]) -> Result<Snapshot> {
        let raw: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| SyncError::Remote(RemoteError::Decode(e.to_string())))?;
        let (snapshot, report) = migrate(&raw, self.repo.clock())?;
        if report.changed() {
            tracing::debug!(shape = ?report.shape, "Migrated remote snapshot");
        }
        Ok(snapshot)
    }

    fn apply_remote(&mut self, remote: Snapshot, metadata: &RemoteMetadata) -> Result<MergeReport> {
        let (mut merged, report) = merge_with_report(self.repo.snapshot(), &remote);
        merged.last_sync = Some(metadata.modified_at);

        self.repo.replace_snapshot(merged);
        self.persist()?;
        self.record_rev(metadata)?;

        tracing::info!(
            from_remote = report.from_remote,
            suppressed = report.suppressed.len(),
            conflicts = report.conflicts.len(),
            "Merged remote snapshot"
        );
        self.emit(SyncEvent::Merged(report.clone()));
        Ok(report)
    }

    /// Turn a remote failure into a sync error, dropping the token on 401.
    fn fail(&mut self, err: RemoteError) -> SyncError {
        let err = SyncError::from(err);
        match &err {
            SyncError::AuthExpired => {
                tracing::warn!("Access token rejected, reconnect required");
                if let Err(e) = self.auth.clear(&mut self.local) {
                    tracing::error!(error = %e, "Failed to clear stored token");
                }
                self.set_status(SyncStatus::Unauthenticated);
                self.emit(SyncEvent::ReconnectRequired);
            }
            other => {
                tracing::error!(error = %other, "Remote call failed");
                self.emit(SyncEvent::Failed(other.to_string()));
            }
        }
        err
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
