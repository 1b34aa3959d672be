//! Per-credential cache scopes.
//!
//! Each credential gets its own [`CacheLayer`], created lazily on first use.
//! Creation goes through the `DashMap` entry API, so racing first requests
//! for the same credential end up sharing a single scope. Scopes for
//! different credentials live on different shards and never share a lock.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;

use super::layer::CacheLayer;
use super::settings::CacheSettings;
use super::traits::Fetcher;

/// Short, stable identifier for a credential, safe to write to logs.
pub fn fingerprint(credential: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(credential.as_bytes());
  let digest = hex::encode(hasher.finalize());
  format!("key-{}", &digest[..12])
}

/// Maps credentials to isolated cache scopes.
pub struct TenantRegistry {
  tenants: DashMap<String, Arc<CacheLayer>>,
  fetcher: Arc<dyn Fetcher>,
  settings: CacheSettings,
}

impl TenantRegistry {
  pub fn new(fetcher: Arc<dyn Fetcher>, settings: CacheSettings) -> Self {
    Self {
      tenants: DashMap::new(),
      fetcher,
      settings,
    }
  }

  /// Return the scope for `credential`, creating it on first use.
  pub fn get_or_create(&self, credential: &str) -> Arc<CacheLayer> {
    if let Some(layer) = self.tenants.get(credential) {
      return Arc::clone(layer.value());
    }

    let layer = self
      .tenants
      .entry(credential.to_string())
      .or_insert_with(|| {
        let label = fingerprint(credential);
        info!(scope = %label, "Creating cache scope");
        Arc::new(CacheLayer::new(label, Arc::clone(&self.fetcher), &self.settings))
      });
    Arc::clone(layer.value())
  }

  /// Return the scope for `credential` without creating one.
  pub fn get(&self, credential: &str) -> Option<Arc<CacheLayer>> {
    self.tenants.get(credential).map(|layer| Arc::clone(layer.value()))
  }

  pub fn settings(&self) -> &CacheSettings {
    &self.settings
  }

  pub fn len(&self) -> usize {
    self.tenants.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tenants.is_empty()
  }

  /// Drop a tenant: clear its store, stop its refresher and free the slot.
  ///
  /// Returns `false` if the credential had no scope. Anyone still holding the
  /// old scope keeps a detached store whose refresher can never restart.
  pub async fn remove(&self, credential: &str) -> bool {
    let Some((_, layer)) = self.tenants.remove(credential) else {
      return false;
    };

    layer.store().clear();
    layer.shutdown(self.settings.shutdown_grace).await;
    info!(scope = %layer.label(), "Removed cache scope");
    true
  }

  /// Tear down every tenant.
  pub async fn shutdown(&self) {
    let credentials: Vec<String> = self.tenants.iter().map(|t| t.key().clone()).collect();
    let removals = credentials.iter().map(|credential| self.remove(credential));
    futures::future::join_all(removals).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::testing::{Reading, ScriptedFetcher};
  use std::time::Duration;

  fn registry(fetcher: &Arc<ScriptedFetcher>, settings: CacheSettings) -> TenantRegistry {
    TenantRegistry::new(fetcher.clone(), settings)
  }

  #[test]
  fn test_fingerprint_hides_credential() {
    let label = fingerprint("super-secret-key");
    assert!(!label.contains("super-secret-key"));
    assert_eq!(label.len(), "key-".len() + 12);
    assert_eq!(label, fingerprint("super-secret-key"));
    assert_ne!(label, fingerprint("other-key"));
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_concurrent_first_access_creates_one_scope() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let registry = Arc::new(registry(&fetcher, CacheSettings::default()));

    let tasks: Vec<_> = (0..16)
      .map(|_| {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.get_or_create("alice") })
      })
      .collect();
    let layers: Vec<Arc<CacheLayer>> = futures::future::join_all(tasks)
      .await
      .into_iter()
      .map(|r| r.unwrap())
      .collect();

    assert_eq!(registry.len(), 1);
    assert!(layers.iter().all(|l| Arc::ptr_eq(l, &layers[0])));
  }

  #[tokio::test]
  async fn test_tenants_are_isolated() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let registry = registry(&fetcher, CacheSettings::default());

    let alice = registry.get_or_create("alice");
    alice.fetch_one::<Reading>("Oslo", "alice").await.unwrap();

    let bob = registry.get_or_create("bob");
    assert!(bob.store().is_empty());
    bob.fetch_one::<Reading>("Oslo", "bob").await.unwrap();

    assert_eq!(fetcher.call_count(), 2);
    assert_eq!(fetcher.calls_for("alice"), 1);
    assert_eq!(fetcher.calls_for("bob"), 1);
    assert_ne!(alice.label(), bob.label());
  }

  #[tokio::test]
  async fn test_get_does_not_create() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let registry = registry(&fetcher, CacheSettings::default());
    assert!(registry.get("alice").is_none());
    assert!(registry.is_empty());
  }

  #[tokio::test]
  async fn test_remove_stops_background_calls_for_tenant() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let settings = CacheSettings {
      ttl: Duration::ZERO,
      refresh_period: Duration::from_millis(20),
      ..CacheSettings::default()
    };
    let registry = registry(&fetcher, settings);

    let alice = registry.get_or_create("alice");
    alice.fetch_one::<Reading>("Oslo", "alice").await.unwrap();
    assert!(alice.ensure_refreshing());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(fetcher.calls_for("alice") > 1);

    assert!(registry.remove("alice").await);
    let after_removal = fetcher.calls_for("alice");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(fetcher.calls_for("alice"), after_removal);
    assert!(registry.get("alice").is_none());
    assert!(alice.store().is_empty());
    // A request still holding the old scope cannot revive its refresher
    assert!(!alice.ensure_refreshing());
    assert!(!alice.is_refreshing());
  }

  #[tokio::test]
  async fn test_remove_unknown_tenant() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let registry = registry(&fetcher, CacheSettings::default());
    assert!(!registry.remove("nobody").await);
  }

  #[tokio::test]
  async fn test_shutdown_removes_all_tenants() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let registry = registry(&fetcher, CacheSettings::default());
    let alice = registry.get_or_create("alice");
    alice.ensure_refreshing();
    registry.get_or_create("bob");

    registry.shutdown().await;

    assert!(registry.is_empty());
    assert!(!alice.is_refreshing());
  }
}
