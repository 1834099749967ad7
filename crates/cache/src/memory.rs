use crate::{CacheEntry, CacheStore, Error, Result};
use tokio::sync::Mutex;

/// In-memory store, for tests and single-process deployments where results
/// do not need to outlive the service.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<hashbrown::HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryStore {
    async fn exists(&self, fingerprint: &str) -> bool {
        self.entries.lock().await.contains_key(fingerprint)
    }

    async fn read(&self, fingerprint: &str) -> Result<CacheEntry> {
        self.entries
            .lock()
            .await
            .get(fingerprint)
            .cloned()
            .ok_or_else(|| Error::NotFound(fingerprint.to_owned()))
    }

    async fn write(&self, fingerprint: &str, entry: &CacheEntry) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(fingerprint.to_owned(), entry.clone());
        Ok(())
    }
}
