use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Error;

/// Client-side key/value storage that survives full-page navigation and never
/// leaves the device (browser local storage, an app data file, memory).
pub trait StateStorage: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the value cannot be written.
    fn put(&self, key: &str, value: String) -> Result<(), Error>;

    /// Read and delete in one step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backing store cannot be read.
    fn take(&self, key: &str) -> Result<Option<String>, Error>;
}

/// Process-local [`StateStorage`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Peek without consuming.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl StateStorage for MemoryStorage {
    fn put(&self, key: &str, value: String) -> Result<(), Error> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    fn take(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key))
    }
}

/// One outstanding third-party authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAttempt {
    pub state: String,
    pub created_at: OffsetDateTime,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum StoredRecord {
    LinkAttempt {
        state: String,
        #[serde(with = "time::serde::rfc3339")]
        created_at: OffsetDateTime,
    },
}

impl LinkAttempt {
    #[must_use]
    pub fn new(state: String) -> Self {
        Self {
            state,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn encode(&self) -> Result<String, Error> {
        serde_json::to_string(&StoredRecord::LinkAttempt {
            state: self.state.clone(),
            created_at: self.created_at,
        })
        .map_err(|e| Error::Storage(e.to_string()))
    }

    fn decode(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw).ok()? {
            StoredRecord::LinkAttempt { state, created_at } if !state.is_empty() => {
                Some(Self { state, created_at })
            }
            StoredRecord::LinkAttempt { .. } => None,
        }
    }

    fn is_expired(&self, ttl: Duration, now: OffsetDateTime) -> bool {
        now > self.created_at + ttl
    }
}

/// Persist `attempt`, superseding any unconsumed one under the same key.
pub(crate) fn save_attempt<S: StateStorage + ?Sized>(
    storage: &S,
    key: &str,
    attempt: &LinkAttempt,
) -> Result<(), Error> {
    storage.put(key, attempt.encode()?)
}

/// Read-once: the record is deleted whatever it contains.
///
/// Malformed or expired records come back as `None`.
pub(crate) fn consume_attempt<S: StateStorage + ?Sized>(
    storage: &S,
    key: &str,
    ttl: Duration,
) -> Result<Option<LinkAttempt>, Error> {
    let Some(raw) = storage.take(key)? else {
        return Ok(None);
    };
    let Some(attempt) = LinkAttempt::decode(&raw) else {
        tracing::warn!("Discarding malformed link attempt record");
        return Ok(None);
    };
    if attempt.is_expired(ttl, OffsetDateTime::now_utc()) {
        tracing::warn!(created_at = %attempt.created_at, "Discarding expired link attempt");
        return Ok(None);
    }
    Ok(Some(attempt))
}
