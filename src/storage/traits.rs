//! Storage trait definitions for single-use protocol artifacts.
//!
//! A [`DataStore`] holds opaque serialized values with an absolute expiry and
//! reports whether a read is the first read of that key. Issued authorization
//! codes and refresh tokens are kept here.

use crate::errors::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, StorageError>;

/// Whether a read observed an entry for the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessCount {
    First,
    Subsequent,
}

impl AccessCount {
    pub fn is_first(&self) -> bool {
        matches!(self, AccessCount::First)
    }
}

/// A stored value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Opaque serialized artifact
    pub value: String,
    /// Absolute expiry; reads at or after this instant behave as absent
    pub expiry: DateTime<Utc>,
    /// Access marker as observed by the reader
    pub access_count: AccessCount,
}

impl Entry {
    /// A fresh, never-read entry.
    pub fn new(value: String, expiry: DateTime<Utc>) -> Self {
        Self {
            value,
            expiry,
            access_count: AccessCount::First,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

/// Trait for single-use detecting key/value storage
///
/// Implementations must make the first-read transition atomic per key:
/// across all concurrent callers exactly one read of a key returns
/// [`AccessCount::First`].
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Read `key`, marking it as read. Expiry is not checked.
    async fn get_unchecked_expiry(&self, key: &str) -> Result<Option<Entry>>;

    /// Read `key`, marking it as read. An expired entry is removed and
    /// reported as absent.
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        let Some(entry) = self.get_unchecked_expiry(key).await? else {
            return Ok(None);
        };

        if entry.is_expired(Utc::now()) {
            self.remove(key).await?;
            return Ok(None);
        }

        Ok(Some(entry))
    }

    /// Store `entry` under `key`, replacing any previous value
    async fn put(&self, key: &str, entry: Entry) -> Result<()>;

    /// Remove `key` if present
    async fn remove(&self, key: &str) -> Result<()>;

    /// Drop every expired entry, returning how many were removed
    async fn cleanup_expired(&self) -> Result<usize>;
}
