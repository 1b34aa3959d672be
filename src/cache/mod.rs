//! Generic read-through caching engine.
//!
//! This module provides a provider-agnostic caching mechanism that:
//! - Stores fetched payloads in bounded (LRU) or unbounded in-memory stores
//! - Serves entries younger than the TTL without an upstream call
//! - Optionally refreshes expired entries in the background, per scope
//! - Isolates scopes per credential when multi-tenant mode is selected

mod layer;
mod refresher;
mod registry;
mod settings;
mod storage;
mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use layer::{decode, CacheLayer, CacheStats, EntryInfo};
pub use refresher::{RefreshJob, Refresher};
pub use registry::{fingerprint, TenantRegistry};
pub use settings::{
  CacheSettings, Capacity, Isolation, RefreshMode, DEFAULT_CAPACITY, DEFAULT_REFRESH_PERIOD,
  DEFAULT_SHUTDOWN_GRACE, DEFAULT_TTL,
};
pub use storage::CacheStore;
pub use traits::{CacheEntry, CacheResult, CacheSource, CredentialValidator, Fetcher};
