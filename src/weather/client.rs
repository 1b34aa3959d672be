use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::cache::Fetcher;
use crate::config::ProviderConfig;
use crate::error::FetchError;

/// Current-weather client for an OpenWeatherMap-compatible endpoint
#[derive(Clone)]
pub struct OpenWeatherClient {
  http: reqwest::Client,
  url: Url,
}

impl OpenWeatherClient {
  pub fn new(config: &ProviderConfig) -> Result<Self> {
    let url = Url::parse(&config.url)
      .map_err(|e| eyre!("Invalid provider URL {}: {}", config.url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(concat!("weathercache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, url })
  }

  fn request_url(&self, city: &str, api_key: &str) -> Url {
    let mut url = self.url.clone();
    url
      .query_pairs_mut()
      .append_pair("q", city)
      .append_pair("appid", api_key)
      .append_pair("units", "metric");
    url
  }
}

#[async_trait]
impl Fetcher for OpenWeatherClient {
  /// Fetch the raw current-weather document for `city`
  async fn fetch(&self, city: &str, api_key: &str) -> Result<String, FetchError> {
    // Errors are stripped of their URL, which carries the API key
    let response = self
      .http
      .get(self.request_url(city, api_key))
      .send()
      .await
      .map_err(|e| FetchError::Provider(e.without_url().to_string()))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| FetchError::Provider(e.without_url().to_string()))?;

    classify(status, body)
  }
}

/// Sort a provider response into a payload or one of the fetch failures.
///
/// The provider reports errors both through the HTTP status and through a
/// `cod` field in the body, which may be a number or a numeric string.
fn classify(status: StatusCode, body: String) -> Result<String, FetchError> {
  let parsed: Value = match serde_json::from_str(&body) {
    Ok(value) => value,
    Err(e) if status.is_success() => return Err(FetchError::InvalidPayload(e.to_string())),
    Err(_) => return Err(FetchError::Provider(format!("HTTP {}", status))),
  };

  let code = parsed
    .get("cod")
    .and_then(|c| c.as_i64().or_else(|| c.as_str().and_then(|s| s.parse().ok())));

  match code {
    Some(200) | None if status.is_success() => Ok(body),
    _ => {
      let message = parsed
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("Unknown API error");
      if message.eq_ignore_ascii_case("city not found") {
        Err(FetchError::NotFound)
      } else {
        Err(FetchError::Provider(message.to_string()))
      }
    }
  }
}
