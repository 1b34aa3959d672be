//! Tunables shared by every cache scope.

use serde::Deserialize;
use std::time::Duration;

/// Default validity window for a cache entry.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Default number of entries per store in bounded mode.
pub const DEFAULT_CAPACITY: usize = 10;

/// Default period between background refresh ticks.
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(60);

/// Default time a refresher gets to stop before it is aborted.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Capacity policy for a cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
  /// Evict the least recently accessed entry beyond this many entries. Zero keeps nothing
  Bounded(usize),
  /// Never evict
  Unbounded,
}

impl Default for Capacity {
  fn default() -> Self {
    Capacity::Bounded(DEFAULT_CAPACITY)
  }
}

impl Capacity {
  /// The entry limit, if any.
  pub fn limit(&self) -> Option<usize> {
    match self {
      Capacity::Bounded(n) => Some(*n),
      Capacity::Unbounded => None,
    }
  }
}

/// How cache scopes are keyed.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Isolation {
  /// One store shared by every credential
  Global,
  /// One store and refresher per credential
  #[default]
  PerCredential,
}

/// Per-request refresh mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshMode {
  /// Fetch on miss or expiry only
  #[default]
  OnDemand,
  /// Also keep the scope's entries fresh in the background
  Polling,
}

impl From<&str> for RefreshMode {
  fn from(mode: &str) -> Self {
    if mode.trim().eq_ignore_ascii_case("polling") {
      RefreshMode::Polling
    } else {
      RefreshMode::OnDemand
    }
  }
}

/// Settings applied to every scope a service creates.
#[derive(Debug, Clone)]
pub struct CacheSettings {
  pub ttl: Duration,
  pub capacity: Capacity,
  pub refresh_period: Duration,
  pub shutdown_grace: Duration,
  pub isolation: Isolation,
}

impl Default for CacheSettings {
  fn default() -> Self {
    Self {
      ttl: DEFAULT_TTL,
      capacity: Capacity::default(),
      refresh_period: DEFAULT_REFRESH_PERIOD,
      shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
      isolation: Isolation::default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_polling_mode_is_case_insensitive() {
    assert_eq!(RefreshMode::from("polling"), RefreshMode::Polling);
    assert_eq!(RefreshMode::from("POLLING"), RefreshMode::Polling);
    assert_eq!(RefreshMode::from(" Polling "), RefreshMode::Polling);
  }

  #[test]
  fn test_unknown_mode_is_on_demand() {
    assert_eq!(RefreshMode::from("on-demand"), RefreshMode::OnDemand);
    assert_eq!(RefreshMode::from(""), RefreshMode::OnDemand);
    assert_eq!(RefreshMode::from("poll"), RefreshMode::OnDemand);
  }

  #[test]
  fn test_defaults() {
    let settings = CacheSettings::default();
    assert_eq!(settings.ttl, Duration::from_secs(60));
    assert_eq!(settings.capacity, Capacity::Bounded(10));
    assert_eq!(settings.refresh_period, Duration::from_secs(60));
    assert_eq!(settings.isolation, Isolation::PerCredential);
  }
}
