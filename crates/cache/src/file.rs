use crate::{CacheEntry, CacheStore, Error, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// File-backed store: one `<fingerprint>.json` per entry under `root`.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        tracing::info!("opening cache store: {}", root.display());
        Ok(Self { root })
    }

    /// Fresh namespace under `root` for one service run, named by its start
    /// time. Entries written by previous runs are left behind and not read.
    pub fn session<P: AsRef<Path>>(root: P, started_at: DateTime<Utc>) -> Result<Self> {
        let dir = root
            .as_ref()
            .join(started_at.format("%Y%m%d-%H%M%S").to_string());
        Self::new(dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, fingerprint: &str) -> PathBuf {
        self.root.join(format!("{fingerprint}.json"))
    }
}

#[async_trait::async_trait]
impl CacheStore for FileStore {
    async fn exists(&self, fingerprint: &str) -> bool {
        tokio::fs::try_exists(self.entry_path(fingerprint))
            .await
            .unwrap_or(false)
    }

    async fn read(&self, fingerprint: &str) -> Result<CacheEntry> {
        let bytes = match tokio::fs::read(self.entry_path(fingerprint)).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(fingerprint.to_owned()));
            }
            Err(error) => return Err(error.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write(&self, fingerprint: &str, entry: &CacheEntry) -> Result<()> {
        let bytes = serde_json::to_vec(entry)?;
        tokio::fs::write(self.entry_path(fingerprint), bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> CacheEntry {
        CacheEntry {
            request: json!({ "hatchers": 6, "proposals": 2 })
                .as_object()
                .cloned()
                .unwrap(),
            result: json!({ "timestep": [1, 2, 3], "token_price": [1.0, 1.2, 0.9] }),
            elapsed_ms: 1234,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let entry = entry();

        assert!(!store.exists("abcd").await);
        store.write("abcd", &entry).await.unwrap();
        assert!(store.exists("abcd").await);

        let read = store.read("abcd").await.unwrap();
        assert_eq!(read.result, entry.result);
        assert_eq!(read.request, entry.request);
        assert_eq!(read.elapsed_ms, 1234);
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let err = store.read("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(fp) if fp == "missing"));
    }

    #[test]
    fn session_creates_timestamped_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let started_at = "2021-03-01T12:30:45Z".parse::<DateTime<Utc>>().unwrap();
        let store = FileStore::session(dir.path(), started_at).unwrap();
        assert_eq!(store.root(), dir.path().join("20210301-123045"));
        assert!(store.root().is_dir());
    }
}
