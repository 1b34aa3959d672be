//! Background refresher that keeps a scope's entries fresh.
//!
//! A refresher moves from inactive to active exactly once; activation is a
//! compare-and-swap guarding a single `tokio::spawn`. The loop ticks
//! immediately and then on a fixed period, refetching every entry whose age
//! has reached the TTL with the credential that originally populated it.
//!
//! # Example
//!
//! ```ignore
//! let refresher = Refresher::new("global", Duration::from_secs(60));
//! refresher.ensure_started(|| RefreshJob::new("global", store, fetcher, ttl));
//! // ...
//! refresher.shutdown(Duration::from_secs(5)).await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::storage::CacheStore;
use super::traits::{CacheEntry, Fetcher};

/// Work performed on each refresher tick.
pub struct RefreshJob {
  label: String,
  store: Arc<CacheStore>,
  fetcher: Arc<dyn Fetcher>,
  ttl: Duration,
}

impl RefreshJob {
  pub fn new(
    label: impl Into<String>,
    store: Arc<CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    ttl: Duration,
  ) -> Self {
    Self {
      label: label.into(),
      store,
      fetcher,
      ttl,
    }
  }

  /// Refetch every stale entry once.
  ///
  /// Entries are snapshotted before any network call so foreground reads and
  /// writes never wait on upstream I/O. Failures are logged per key and leave
  /// the stale entry in place.
  pub async fn tick(&self, shutdown: &CancellationToken) {
    let stale: Vec<(String, CacheEntry)> = self
      .store
      .entries()
      .into_iter()
      .filter(|(_, entry)| entry.is_stale(self.ttl))
      .collect();

    if stale.is_empty() {
      debug!(scope = %self.label, "Refresh tick: nothing stale");
      return;
    }

    let mut refreshed = 0usize;
    let mut failed = 0usize;

    for (key, entry) in stale {
      if shutdown.is_cancelled() {
        break;
      }

      match self.fetcher.fetch(&key, &entry.owner).await {
        Ok(payload) => {
          if shutdown.is_cancelled() {
            break;
          }
          let fresh = CacheEntry::new(key.clone(), payload, Arc::clone(&entry.owner));
          if self.store.replace_if(&key, entry.fetched_at, fresh) {
            refreshed += 1;
            info!(scope = %self.label, city = %key, "Refreshed cached weather");
          } else {
            debug!(scope = %self.label, city = %key, "Entry changed during refresh, dropping result");
          }
        }
        Err(e) => {
          failed += 1;
          warn!(scope = %self.label, city = %key, error = %e, "Background refresh failed");
        }
      }
    }

    debug!(scope = %self.label, refreshed, failed, "Refresh tick complete");
  }
}

/// Lazily started, periodically ticking background task for one scope.
pub struct Refresher {
  label: String,
  period: Duration,
  started: AtomicBool,
  shutdown: CancellationToken,
  task: Mutex<Option<JoinHandle<()>>>,
}

impl Refresher {
  pub fn new(label: impl Into<String>, period: Duration) -> Self {
    Self {
      label: label.into(),
      period: period.max(Duration::from_millis(1)),
      started: AtomicBool::new(false),
      shutdown: CancellationToken::new(),
      task: Mutex::new(None),
    }
  }

  /// Whether the loop has been started and not yet torn down.
  pub fn is_active(&self) -> bool {
    self.started.load(Ordering::Acquire) && !self.shutdown.is_cancelled()
  }

  /// Start the loop unless it was already started or torn down.
  ///
  /// `job` is only invoked by the caller that wins activation. Returns `true`
  /// for that caller.
  pub fn ensure_started(&self, job: impl FnOnce() -> RefreshJob) -> bool {
    if self.shutdown.is_cancelled() {
      return false;
    }
    if self
      .started
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return false;
    }

    info!(scope = %self.label, period_secs = self.period.as_secs_f64(), "Starting background refresh");
    let handle = tokio::spawn(run(job(), self.period, self.shutdown.clone()));
    *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    true
  }

  /// Stop the loop, waiting up to `grace` before aborting it.
  ///
  /// After this the refresher can never be started again.
  pub async fn shutdown(&self, grace: Duration) {
    self.shutdown.cancel();

    let handle = self
      .task
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
    let Some(mut handle) = handle else {
      return;
    };

    match tokio::time::timeout(grace, &mut handle).await {
      Ok(_) => debug!(scope = %self.label, "Refresher exited"),
      Err(_) => {
        warn!(
          scope = %self.label,
          grace_ms = grace.as_millis() as u64,
          "Refresher did not stop within grace period, aborting"
        );
        handle.abort();
      }
    }
  }
}

impl Drop for Refresher {
  fn drop(&mut self) {
    self.shutdown.cancel();
  }
}

async fn run(job: RefreshJob, period: Duration, shutdown: CancellationToken) {
  let mut interval = tokio::time::interval(period);
  interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

  loop {
    tokio::select! {
      biased;

      _ = shutdown.cancelled() => break,

      _ = interval.tick() => {
        job.tick(&shutdown).await;
      }
    }
  }

  info!(scope = %job.label, "Background refresh stopped");
}
