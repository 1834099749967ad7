use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;
mod file;
mod memory;

pub use error::Error;
pub use file::FileStore;
pub use memory::MemoryStore;

pub type Result<T> = std::result::Result<T, Error>;

/// Persisted record of a completed simulation run, addressed by fingerprint.
///
/// Written exactly once when a run finishes, never mutated afterwards.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CacheEntry {
    /// The request body the run was computed for.
    pub request: serde_json::Map<String, serde_json::Value>,
    /// The simulation's final JSON document.
    pub result: serde_json::Value,
    /// Wall time of the external process.
    pub elapsed_ms: u64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

/// Storage backend for completed runs.
///
/// `write` is called at most once per fingerprint; the orchestrator
/// serializes producers, the store does not.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync + 'static {
    async fn exists(&self, fingerprint: &str) -> bool;

    async fn read(&self, fingerprint: &str) -> Result<CacheEntry>;

    async fn write(&self, fingerprint: &str, entry: &CacheEntry) -> Result<()>;
}
