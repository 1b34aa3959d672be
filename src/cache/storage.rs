//! In-memory cache store with access-ordered LRU eviction.
//!
//! Each store owns its own lock, so scopes never contend with each other.
//! Recency is tracked with a monotonically increasing access tick: the hash
//! map holds entries, and a `BTreeMap` from tick to key gives the eviction
//! order.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::settings::Capacity;
use super::traits::CacheEntry;

struct Slot {
  entry: CacheEntry,
  tick: u64,
}

#[derive(Default)]
struct LruMap {
  slots: HashMap<String, Slot>,
  /// Access tick -> key, oldest first
  recency: BTreeMap<u64, String>,
  next_tick: u64,
}

impl LruMap {
  fn bump(&mut self) -> u64 {
    let tick = self.next_tick;
    self.next_tick += 1;
    tick
  }

  fn get(&mut self, key: &str) -> Option<CacheEntry> {
    let tick = self.bump();
    let slot = self.slots.get_mut(key)?;
    self.recency.remove(&slot.tick);
    slot.tick = tick;
    self.recency.insert(tick, key.to_string());
    Some(slot.entry.clone())
  }

  /// Insert or overwrite, returning any keys evicted to make room.
  fn insert(&mut self, key: &str, entry: CacheEntry, limit: Option<usize>) -> Vec<String> {
    let tick = self.bump();
    if let Some(slot) = self.slots.get_mut(key) {
      self.recency.remove(&slot.tick);
      slot.tick = tick;
      slot.entry = entry;
      self.recency.insert(tick, key.to_string());
      return Vec::new();
    }

    let mut evicted = Vec::new();
    if let Some(limit) = limit {
      if limit == 0 {
        return evicted;
      }
      while self.slots.len() >= limit {
        match self.recency.pop_first() {
          Some((_, oldest)) => {
            self.slots.remove(&oldest);
            evicted.push(oldest);
          }
          None => break,
        }
      }
    }

    self.slots.insert(key.to_string(), Slot { entry, tick });
    self.recency.insert(tick, key.to_string());
    evicted
  }

  fn remove(&mut self, key: &str) -> Option<CacheEntry> {
    let slot = self.slots.remove(key)?;
    self.recency.remove(&slot.tick);
    Some(slot.entry)
  }

  fn clear(&mut self) {
    self.slots.clear();
    self.recency.clear();
  }
}

/// Keyed storage for [`CacheEntry`] values with a capacity policy.
pub struct CacheStore {
  inner: Mutex<LruMap>,
  capacity: Capacity,
}

impl CacheStore {
  pub fn new(capacity: Capacity) -> Self {
    Self {
      inner: Mutex::new(LruMap::default()),
      capacity,
    }
  }

  // The map is never left half-updated, so a poisoned lock is still usable.
  fn lock(&self) -> MutexGuard<'_, LruMap> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Look up an entry, marking it as most recently accessed.
  pub fn get(&self, key: &str) -> Option<CacheEntry> {
    self.lock().get(key)
  }

  /// Look up an entry without touching recency.
  pub fn peek(&self, key: &str) -> Option<CacheEntry> {
    self.lock().slots.get(key).map(|slot| slot.entry.clone())
  }

  /// Insert or overwrite an entry. In bounded mode this may evict the least
  /// recently accessed entries first. A store bounded to zero keeps nothing.
  pub fn put(&self, key: &str, entry: CacheEntry) {
    let evicted = self.lock().insert(key, entry, self.capacity.limit());
    for old in evicted {
      debug!(evicted = %old, inserted = %key, "Evicted least recently used entry");
    }
  }

  /// Overwrite an entry in place, keeping its recency, but only while it is
  /// still the one fetched at `expected`.
  ///
  /// Returns `false` without writing if the key is gone or was rewritten since.
  pub fn replace_if(&self, key: &str, expected: DateTime<Utc>, entry: CacheEntry) -> bool {
    match self.lock().slots.get_mut(key) {
      Some(slot) if slot.entry.fetched_at == expected => {
        slot.entry = entry;
        true
      }
      _ => false,
    }
  }

  pub fn remove(&self, key: &str) -> Option<CacheEntry> {
    self.lock().remove(key)
  }

  /// Snapshot of keys, least recently accessed first.
  pub fn keys(&self) -> Vec<String> {
    self.lock().recency.values().cloned().collect()
  }

  /// Snapshot of all entries, least recently accessed first. Does not touch recency.
  pub fn entries(&self) -> Vec<(String, CacheEntry)> {
    let map = self.lock();
    map
      .recency
      .values()
      .filter_map(|key| map.slots.get(key).map(|slot| (key.clone(), slot.entry.clone())))
      .collect()
  }

  pub fn clear(&self) {
    self.lock().clear();
  }

  pub fn len(&self) -> usize {
    self.lock().slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn capacity(&self) -> Capacity {
    self.capacity
  }
}
