//! Test doubles for the cache collaborators.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{CredentialValidator, Fetcher};
use crate::error::FetchError;

type Respond = Box<dyn Fn(&str, &str, usize) -> Result<String, FetchError> + Send + Sync>;

/// Decoded form of [`reading_json`] payloads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Reading {
  pub name: String,
  pub n: usize,
}

/// Payload for `city` tagged with the fetch number `n`.
pub fn reading_json(city: &str, n: usize) -> String {
  serde_json::json!({ "name": city, "n": n }).to_string()
}

/// Fetcher that records every call and answers from a closure.
pub struct ScriptedFetcher {
  respond: Respond,
  calls: Mutex<Vec<(String, String)>>,
  delay: Duration,
}

impl ScriptedFetcher {
  /// Answer every call with a [`reading_json`] payload numbered by call order.
  pub fn new() -> Self {
    Self::with_response(|key, _, n| Ok(reading_json(key, n)))
  }

  /// Answer with `respond(key, credential, call_number)`. Call numbers start at 1.
  pub fn with_response<F>(respond: F) -> Self
  where
    F: Fn(&str, &str, usize) -> Result<String, FetchError> + Send + Sync + 'static,
  {
    Self {
      respond: Box::new(respond),
      calls: Mutex::new(Vec::new()),
      delay: Duration::ZERO,
    }
  }

  /// Sleep this long inside every fetch.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn calls(&self) -> Vec<(String, String)> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  pub fn calls_for(&self, credential: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|(_, c)| c == credential)
      .count()
  }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
  async fn fetch(&self, key: &str, credential: &str) -> Result<String, FetchError> {
    let n = {
      let mut calls = self.calls.lock().unwrap();
      calls.push((key.to_string(), credential.to_string()));
      calls.len()
    };
    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }
    (self.respond)(key, credential, n)
  }
}

/// Accepts only the listed credentials.
pub struct AllowList(pub Vec<&'static str>);

impl AllowList {
  pub fn arc(keys: &[&'static str]) -> Arc<Self> {
    Arc::new(Self(keys.to_vec()))
  }
}

impl CredentialValidator for AllowList {
  fn is_valid(&self, credential: &str) -> bool {
    self.0.contains(&credential)
  }
}
