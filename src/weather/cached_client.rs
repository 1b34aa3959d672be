//! Cached weather client that wraps a fetcher with transparent caching.

use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cache::{
  CacheLayer, CacheResult, CacheSettings, CacheStats, Capacity, CredentialValidator, EntryInfo,
  Fetcher, Isolation, RefreshMode, TenantRegistry,
};
use crate::config::Config;
use crate::db::KeyStore;
use crate::error::{Error, Result};

use super::client::OpenWeatherClient;

/// Where scopes come from.
enum Scopes {
  /// Every credential shares one store. Its refresher refreshes each entry
  /// with the credential that fetched it, whichever request started polling.
  Global(Arc<CacheLayer>),
  /// One scope per credential, created on first use.
  PerCredential(TenantRegistry),
}

/// Outcome for one city of a batch request.
#[derive(Debug)]
pub struct CityResult<T> {
  pub city: String,
  pub result: Result<CacheResult<T>>,
}

/// Weather client with transparent caching support.
///
/// Every call checks the credential first; an unknown credential never
/// touches the cache or the provider.
pub struct CachedWeatherClient {
  validator: Arc<dyn CredentialValidator>,
  scopes: Scopes,
  shutdown_grace: Duration,
}

impl CachedWeatherClient {
  pub fn new(
    fetcher: Arc<dyn Fetcher>,
    validator: Arc<dyn CredentialValidator>,
    settings: CacheSettings,
  ) -> Self {
    let shutdown_grace = settings.shutdown_grace;
    let scopes = match settings.isolation {
      Isolation::Global => Scopes::Global(Arc::new(CacheLayer::new("global", fetcher, &settings))),
      Isolation::PerCredential => Scopes::PerCredential(TenantRegistry::new(fetcher, settings)),
    };

    Self {
      validator,
      scopes,
      shutdown_grace,
    }
  }

  /// Build a client for the configured provider, validating against `keys`.
  pub fn from_config(config: &Config, keys: Arc<KeyStore>) -> color_eyre::Result<Self> {
    let fetcher = OpenWeatherClient::new(&config.provider)?;
    let settings = config.cache.settings()?;
    info!(
      isolation = ?settings.isolation,
      ttl_secs = settings.ttl.as_secs(),
      capacity = ?settings.capacity,
      "Weather cache configured"
    );
    Ok(Self::new(Arc::new(fetcher), keys, settings))
  }

  pub fn isolation(&self) -> Isolation {
    match self.scopes {
      Scopes::Global(_) => Isolation::Global,
      Scopes::PerCredential(_) => Isolation::PerCredential,
    }
  }

  fn check(&self, credential: &str) -> Result<()> {
    if self.validator.is_valid(credential) {
      Ok(())
    } else {
      Err(Error::CredentialInvalid)
    }
  }

  /// The scope for `credential`, created if needed.
  fn scope(&self, credential: &str) -> Arc<CacheLayer> {
    match &self.scopes {
      Scopes::Global(layer) => Arc::clone(layer),
      Scopes::PerCredential(registry) => registry.get_or_create(credential),
    }
  }

  /// The scope for `credential`, if one exists.
  fn existing_scope(&self, credential: &str) -> Option<Arc<CacheLayer>> {
    match &self.scopes {
      Scopes::Global(layer) => Some(Arc::clone(layer)),
      Scopes::PerCredential(registry) => registry.get(credential),
    }
  }

  /// Get current weather for a city with caching.
  ///
  /// `RefreshMode::Polling` additionally starts background refresh for the
  /// credential's scope if it is not running yet.
  pub async fn get_weather<T>(
    &self,
    city: &str,
    credential: &str,
    mode: RefreshMode,
  ) -> Result<CacheResult<T>>
  where
    T: DeserializeOwned,
  {
    self.check(credential)?;

    let scope = self.scope(credential);
    if mode == RefreshMode::Polling {
      scope.ensure_refreshing();
    }
    scope.fetch_one(city, credential).await
  }

  /// Get current weather for several cities, one result per city in input order.
  ///
  /// A failure for one city does not fail the others. Cities are looked up
  /// in order, so a city repeated in the batch is served from the cache.
  pub async fn get_many<T>(
    &self,
    cities: &[String],
    credential: &str,
    mode: RefreshMode,
  ) -> Result<Vec<CityResult<T>>>
  where
    T: DeserializeOwned,
  {
    if cities.is_empty() {
      return Err(Error::NoKeysRequested);
    }
    self.check(credential)?;

    let mut results = Vec::with_capacity(cities.len());
    for city in cities {
      results.push(CityResult {
        city: city.clone(),
        result: self.get_weather(city, credential, mode).await,
      });
    }
    Ok(results)
  }

  /// Cities currently cached for `credential`, least recently used first.
  pub fn cached_cities(&self, credential: &str) -> Result<Vec<String>> {
    self.check(credential)?;
    Ok(
      self
        .existing_scope(credential)
        .map(|scope| scope.store().keys())
        .unwrap_or_default(),
    )
  }

  /// What is cached for one city, without refreshing it.
  pub fn cached_city_info(&self, credential: &str, city: &str) -> Result<EntryInfo> {
    self.check(credential)?;
    let scope = self
      .existing_scope(credential)
      .ok_or(Error::TenantNotFound)?;
    scope
      .entry_info(city)
      .ok_or_else(|| Error::KeyNotCached(city.to_string()))
  }

  pub fn cache_stats(&self, credential: &str) -> Result<CacheStats> {
    self.check(credential)?;
    Ok(match self.existing_scope(credential) {
      Some(scope) => scope.stats(),
      None => CacheStats {
        size: 0,
        capacity: self.capacity(),
        polling_active: false,
      },
    })
  }

  fn capacity(&self) -> Capacity {
    match &self.scopes {
      Scopes::Global(layer) => layer.store().capacity(),
      Scopes::PerCredential(registry) => registry.settings().capacity,
    }
  }

  /// Empty the credential's cache. Background refresh keeps running.
  pub fn clear_cache(&self, credential: &str) -> Result<()> {
    self.check(credential)?;
    if let Some(scope) = self.existing_scope(credential) {
      scope.store().clear();
    }
    Ok(())
  }

  /// Discard everything held for `credential`.
  ///
  /// In per-credential mode this clears the tenant's store, stops its
  /// refresher and frees its slot; returns `false` if it had none. Global
  /// mode has no tenants, so nothing is removed and the result is `false`.
  pub async fn remove_tenant(&self, credential: &str) -> Result<bool> {
    self.check(credential)?;
    match &self.scopes {
      Scopes::Global(_) => Ok(false),
      Scopes::PerCredential(registry) => Ok(registry.remove(credential).await),
    }
  }

  /// Stop all background refresh.
  pub async fn shutdown(&self) {
    match &self.scopes {
      Scopes::Global(layer) => layer.shutdown(self.shutdown_grace).await,
      Scopes::PerCredential(registry) => registry.shutdown().await,
    }
  }
}
