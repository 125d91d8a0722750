use super::{RemoteMetadata, RemoteStore};
use crate::error::RemoteError;
use async_trait::async_trait;
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tasklane_engine::Timestamp;

/// A failure to inject into the next remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Unauthorized,
    Network,
    Conflict,
}

impl Fault {
    fn into_error(self, path: &str) -> RemoteError {
        match self {
            Fault::Unauthorized => RemoteError::Unauthorized,
            Fault::Network => RemoteError::Network("connection reset".into()),
            Fault::Conflict => RemoteError::Conflict(path.to_string()),
        }
    }
}

#[derive(Debug)]
struct Blob {
    body: Vec<u8>,
    modified_at: Timestamp,
    rev: u64,
}

#[derive(Debug)]
struct Inner {
    token: String,
    blobs: HashMap<String, Blob>,
    faults: VecDeque<Fault>,
    upload_faults: VecDeque<Fault>,
    next_modified: Timestamp,
    downloads: usize,
    uploads: usize,
}

/// Blob store kept in memory. Clones share state, so a test can keep a
/// handle while a controller owns another.
///
/// Every upload advances the server clock by one second.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRemote {
    /// A store accepting only `token`, whose first write is stamped `start`.
    pub fn new(token: impl Into<String>, start: Timestamp) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                token: token.into(),
                blobs: HashMap::new(),
                faults: VecDeque::new(),
                upload_faults: VecDeque::new(),
                next_modified: start,
                downloads: 0,
                uploads: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Place a blob as if another device had written it.
    pub fn put(&self, path: &str, body: impl Into<Vec<u8>>) -> Timestamp {
        self.lock().write(path, body.into()).modified_at
    }

    /// Place a blob stamped `modified_at`, as a server with coarse
    /// timestamps would for two writes in the same second.
    pub fn put_at(&self, path: &str, body: impl Into<Vec<u8>>, modified_at: Timestamp) {
        self.lock().write_at(path, body.into(), modified_at);
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().blobs.get(path).map(|b| b.body.clone())
    }

    /// Fail the next call with `fault`. Faults queue up in order.
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    /// Fail the next upload with `fault`, letting other calls through.
    pub fn inject_on_upload(&self, fault: Fault) {
        self.lock().upload_faults.push_back(fault);
    }

    /// Revoke the current token.
    pub fn rotate_token(&self, token: impl Into<String>) {
        self.lock().token = token.into();
    }

    pub fn downloads(&self) -> usize {
        self.lock().downloads
    }

    pub fn uploads(&self) -> usize {
        self.lock().uploads
    }
}

impl Inner {
    fn admit(&mut self, token: &str, path: &str) -> Result<(), RemoteError> {
        if let Some(fault) = self.faults.pop_front() {
            return Err(fault.into_error(path));
        }
        if token != self.token {
            return Err(RemoteError::Unauthorized);
        }
        Ok(())
    }

    fn write(&mut self, path: &str, body: Vec<u8>) -> RemoteMetadata {
        let modified_at = self.next_modified;
        self.write_at(path, body, modified_at)
    }

    fn write_at(&mut self, path: &str, body: Vec<u8>, modified_at: Timestamp) -> RemoteMetadata {
        self.next_modified = self.next_modified.max(modified_at + Duration::seconds(1));
        let rev = self.blobs.get(path).map_or(1, |b| b.rev + 1);
        let meta = RemoteMetadata {
            path: path.to_string(),
            modified_at,
            size: Some(body.len() as u64),
            rev: Some(format!("{rev:x}")),
        };
        self.blobs.insert(
            path.to_string(),
            Blob {
                body,
                modified_at,
                rev,
            },
        );
        meta
    }

    fn metadata(&self, path: &str) -> Option<RemoteMetadata> {
        self.blobs.get(path).map(|b| RemoteMetadata {
            path: path.to_string(),
            modified_at: b.modified_at,
            size: Some(b.body.len() as u64),
            rev: Some(format!("{:x}", b.rev)),
        })
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn get_metadata(&self, token: &str, path: &str) -> Result<RemoteMetadata, RemoteError> {
        let mut inner = self.lock();
        inner.admit(token, path)?;
        inner
            .metadata(path)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))
    }

    async fn download(&self, token: &str, path: &str) -> Result<Vec<u8>, RemoteError> {
        let mut inner = self.lock();
        inner.admit(token, path)?;
        inner.downloads += 1;
        inner
            .blobs
            .get(path)
            .map(|b| b.body.clone())
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))
    }

    async fn upload(
        &self,
        token: &str,
        path: &str,
        body: Vec<u8>,
    ) -> Result<RemoteMetadata, RemoteError> {
        let mut inner = self.lock();
        if let Some(fault) = inner.upload_faults.pop_front() {
            return Err(fault.into_error(path));
        }
        inner.admit(token, path)?;
        inner.uploads += 1;
        Ok(inner.write(path, body))
    }
}
