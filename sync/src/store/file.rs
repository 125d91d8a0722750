use super::LocalStore;
use crate::error::StoreError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// One file per key inside a data directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = FileStore::open(dir.path().join("data")).unwrap();
        store.set("categories", r#"{"inbox":[]}"#).unwrap();

        let reopened = FileStore::open(dir.path().join("data")).unwrap();
        assert_eq!(
            reopened.get("categories").unwrap().as_deref(),
            Some(r#"{"inbox":[]}"#)
        );
        assert!(reopened.get("lastSync").unwrap().is_none());
    }

    #[test]
    fn test_overwrite_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();

        store.set("accessToken", "one").unwrap();
        store.set("accessToken", "two").unwrap();
        assert_eq!(store.get("accessToken").unwrap().as_deref(), Some("two"));
        assert!(!dir.path().join("accessToken.json.tmp").exists());

        store.remove("accessToken").unwrap();
        store.remove("accessToken").unwrap();
        assert!(store.get("accessToken").unwrap().is_none());
    }
}
