//! Error types for the cache engine and its collaborators.

use thiserror::Error;

/// Errors surfaced to callers of the cache engine.
#[derive(Debug, Error)]
pub enum Error {
  /// The credential is not registered. Raised before any cache access.
  #[error("API key is not registered")]
  CredentialInvalid,

  /// The provider has no data for this key. Never cached.
  #[error("weather data not found for '{0}'")]
  KeyNotFoundUpstream(String),

  /// Transient upstream failure. Never cached.
  #[error("weather provider unavailable: {0}")]
  ProviderUnavailable(String),

  /// A payload could not be decoded into the requested type.
  #[error("failed to decode payload for '{key}': {source}")]
  DecodePayloadFailed {
    key: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("no cache exists for this API key")]
  TenantNotFound,

  #[error("'{0}' is not in the cache")]
  KeyNotCached(String),

  #[error("at least one city is required")]
  NoKeysRequested,
}

impl Error {
  /// Map a collaborator failure for `key` onto the caller-facing taxonomy.
  pub fn from_fetch(key: &str, err: FetchError) -> Self {
    match err {
      FetchError::NotFound => Self::KeyNotFoundUpstream(key.to_string()),
      FetchError::Provider(message) => Self::ProviderUnavailable(message),
      FetchError::InvalidPayload(message) => {
        Self::ProviderUnavailable(format!("unreadable response: {}", message))
      }
    }
  }
}

/// Outcome of a failed upstream fetch, as reported by a [`crate::cache::Fetcher`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  #[error("not found upstream")]
  NotFound,
  #[error("provider error: {0}")]
  Provider(String),
  #[error("invalid payload: {0}")]
  InvalidPayload(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_not_found_carries_key() {
    let err = Error::from_fetch("Atlantis", FetchError::NotFound);
    assert!(matches!(err, Error::KeyNotFoundUpstream(ref k) if k == "Atlantis"));
  }

  #[test]
  fn test_invalid_payload_is_provider_failure() {
    let err = Error::from_fetch("Oslo", FetchError::InvalidPayload("eof".into()));
    assert!(matches!(err, Error::ProviderUnavailable(_)));
    assert!(err.to_string().contains("eof"));
  }
}
