//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::refresher::{RefreshJob, Refresher};
use super::settings::{CacheSettings, Capacity};
use super::storage::CacheStore;
use super::traits::{CacheEntry, CacheResult, Fetcher};
use crate::error::{Error, Result};

/// Size and refresh state of one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
  pub size: usize,
  pub capacity: Capacity,
  pub polling_active: bool,
}

/// What the cache currently holds for one key.
#[derive(Debug, Clone)]
pub struct EntryInfo {
  pub key: String,
  pub fetched_at: DateTime<Utc>,
  pub age: Duration,
  pub payload: Arc<str>,
}

/// One cache scope: a store, its refresher, and the fetcher both use.
///
/// This layer sits between the caller and the upstream fetcher, serving
/// fresh entries from memory and refetching missing or expired ones.
pub struct CacheLayer {
  label: String,
  store: Arc<CacheStore>,
  fetcher: Arc<dyn Fetcher>,
  /// How long before cached data is considered stale
  ttl: Duration,
  refresher: Refresher,
}

impl CacheLayer {
  /// Create a new scope. `label` identifies it in logs and must not be a raw credential.
  pub fn new(label: impl Into<String>, fetcher: Arc<dyn Fetcher>, settings: &CacheSettings) -> Self {
    let label = label.into();
    Self {
      refresher: Refresher::new(label.clone(), settings.refresh_period),
      store: Arc::new(CacheStore::new(settings.capacity)),
      fetcher,
      ttl: settings.ttl,
      label,
    }
  }

  pub fn label(&self) -> &str {
    &self.label
  }

  pub fn store(&self) -> &Arc<CacheStore> {
    &self.store
  }

  /// Read-through fetch of `key`.
  ///
  /// 1. A fresh entry that decodes is returned without an upstream call
  /// 2. A fresh entry that fails to decode is treated as a miss
  /// 3. A stale entry is removed before refetching
  /// 4. The fetch result is cached on success; failures cache nothing
  pub async fn fetch_one<T>(&self, key: &str, credential: &str) -> Result<CacheResult<T>>
  where
    T: DeserializeOwned,
  {
    if let Some(cached) = self.store.get(key) {
      if !cached.is_stale(self.ttl) {
        match decode::<T>(key, &cached.payload) {
          Ok(data) => {
            debug!(scope = %self.label, city = %key, "Cache hit");
            return Ok(CacheResult::from_cache(data, cached.fetched_at));
          }
          Err(e) => {
            warn!(scope = %self.label, city = %key, error = %e, "Cached payload is corrupted, refetching");
          }
        }
      } else {
        debug!(scope = %self.label, city = %key, "Cache entry expired");
        self.store.remove(key);
      }
    }

    let payload = self
      .fetcher
      .fetch(key, credential)
      .await
      .map_err(|e| Error::from_fetch(key, e))?;

    let entry = CacheEntry::new(key, payload, credential);
    let fetched_at = entry.fetched_at;
    let decoded = decode::<T>(key, &entry.payload);
    self.store.put(key, entry);

    Ok(CacheResult::from_network(decoded?, fetched_at))
  }

  /// Start background refresh for this scope if it is not running yet.
  ///
  /// Returns `true` only for the call that actually started it.
  pub fn ensure_refreshing(&self) -> bool {
    self.refresher.ensure_started(|| {
      RefreshJob::new(
        self.label.clone(),
        Arc::clone(&self.store),
        Arc::clone(&self.fetcher),
        self.ttl,
      )
    })
  }

  pub fn is_refreshing(&self) -> bool {
    self.refresher.is_active()
  }

  pub fn stats(&self) -> CacheStats {
    CacheStats {
      size: self.store.len(),
      capacity: self.store.capacity(),
      polling_active: self.refresher.is_active(),
    }
  }

  /// Inspect a cached entry without affecting its recency.
  pub fn entry_info(&self, key: &str) -> Option<EntryInfo> {
    self.store.peek(key).map(|entry| EntryInfo {
      age: entry.age(),
      key: entry.key,
      fetched_at: entry.fetched_at,
      payload: entry.payload,
    })
  }

  /// Stop background refresh, waiting at most `grace`.
  pub async fn shutdown(&self, grace: Duration) {
    self.refresher.shutdown(grace).await;
  }
}

/// Decode a payload into the caller's type.
pub fn decode<T: DeserializeOwned>(key: &str, payload: &str) -> Result<T> {
  serde_json::from_str(payload).map_err(|source| Error::DecodePayloadFailed {
    key: key.to_string(),
    source,
  })
}
