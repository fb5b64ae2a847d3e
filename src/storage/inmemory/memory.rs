//! In-memory data store implementation
//!
//! Entries live in a single `Mutex<HashMap>`; every operation runs inside one
//! critical section, which makes the first-read transition atomic.

use crate::errors::StorageError;
use crate::storage::traits::{AccessCount, DataStore, Entry, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory data store (for testing/development)
#[derive(Default)]
pub struct MemoryDataStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryDataStore {
    /// Create a new memory data store
    pub fn new() -> Self {
        tracing::warn!(
            "memory data store cannot be shared by multiple authorization server instances"
        );
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|e| StorageError::LockPoisoned(format!("Lock error: {}", e)))
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn get_unchecked_expiry(&self, key: &str) -> Result<Option<Entry>> {
        let mut entries = self.lock()?;
        Ok(entries.get_mut(key).map(|entry| {
            let observed = entry.clone();
            entry.access_count = AccessCount::Subsequent;
            observed
        }))
    }

    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        let mut entries = self.lock()?;
        let now = Utc::now();

        let expired = match entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }

        Ok(entries.get_mut(key).map(|entry| {
            let observed = entry.clone();
            entry.access_count = AccessCount::Subsequent;
            observed
        }))
    }

    async fn put(&self, key: &str, entry: Entry) -> Result<()> {
        let mut entries = self.lock()?;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.lock()?;
        entries.remove(key);
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let mut entries = self.lock()?;
        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }
}
