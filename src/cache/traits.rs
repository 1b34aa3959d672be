//! Core traits and types for the caching system.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::error::FetchError;

/// Performs the actual upstream retrieval for a key.
///
/// The returned payload is treated as an opaque blob; only callers decode it.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, key: &str, credential: &str) -> Result<String, FetchError>;
}

/// Decides whether a credential may use the cache at all.
pub trait CredentialValidator: Send + Sync {
  fn is_valid(&self, credential: &str) -> bool;
}

/// Snapshot of the last successful fetch for a key.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub key: String,
  /// Raw upstream payload
  pub payload: Arc<str>,
  /// When the payload was fetched
  pub fetched_at: DateTime<Utc>,
  /// Credential the payload was fetched with; background refresh reuses it
  pub owner: Arc<str>,
}

impl CacheEntry {
  /// Create an entry stamped with the current time.
  pub fn new(key: impl Into<String>, payload: impl Into<Arc<str>>, owner: impl Into<Arc<str>>) -> Self {
    Self {
      key: key.into(),
      payload: payload.into(),
      fetched_at: Utc::now(),
      owner: owner.into(),
    }
  }

  /// Override the fetch timestamp.
  pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
    self.fetched_at = fetched_at;
    self
  }

  /// Time elapsed since the fetch. A timestamp in the future counts as zero.
  pub fn age(&self) -> Duration {
    (Utc::now() - self.fetched_at).to_std().unwrap_or_default()
  }

  pub fn is_stale(&self, ttl: Duration) -> bool {
    self.age() >= ttl
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The decoded data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the underlying payload was fetched upstream
  pub fetched_at: DateTime<Utc>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T, fetched_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      fetched_at,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, fetched_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      fetched_at,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched upstream during this call
  Network,
  /// Served from a fresh cache entry
  Cache,
}

impl CacheSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      CacheSource::Network => "network",
      CacheSource::Cache => "cache",
    }
  }
}
