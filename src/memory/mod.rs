//! Durable memory collaborator.
//!
//! The engine mirrors every todo into a namespaced key-value store so
//! work survives the process. The in-memory table stays authoritative;
//! the mirror is best-effort.

pub mod postgres;

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use postgres::PgMemoryStore;

/// One write to the memory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub key: String,
    /// Serialized payload. Opaque to the store.
    pub value: String,
    pub namespace: String,
    /// Retention hint in seconds. `None` leaves retention to store policy.
    pub ttl_secs: Option<u64>,
}

/// Anything that can persist memory entries.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert or overwrite the entry at `(namespace, key)`.
    async fn store(&self, entry: MemoryEntry) -> Result<()>;
}

/// Process-local store. Keeps the latest entry per `(namespace, key)`
/// and counts writes; can be told to reject writes.
#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<(String, String), MemoryEntry>>,
    writes: Mutex<Vec<MemoryEntry>>,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Latest entry stored under `(namespace, key)`.
    pub fn get(&self, namespace: &str, key: &str) -> Option<MemoryEntry> {
        self.entries
            .lock()
            .ok()?
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
    }

    /// Every successful write, oldest first.
    pub fn writes(&self) -> Vec<MemoryEntry> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn store(&self, entry: MemoryEntry) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Memory(format!(
                "write rejected for {}/{}",
                entry.namespace, entry.key
            )));
        }

        let slot = (entry.namespace.clone(), entry.key.clone());
        self.entries
            .lock()
            .map_err(|_| Error::Memory("memory store lock poisoned".to_string()))?
            .insert(slot, entry.clone());
        self.writes
            .lock()
            .map_err(|_| Error::Memory("memory store lock poisoned".to_string()))?
            .push(entry);
        Ok(())
    }
}
