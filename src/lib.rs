//! Read-through caching front for a weather provider.
//!
//! Fetched payloads are kept in per-scope stores with a TTL and an LRU
//! capacity bound. Scopes can also be kept fresh by a lazily started
//! background refresher. A scope is either one global namespace or one
//! namespace per API key.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod weather;

pub use error::{Error, FetchError, Result};
