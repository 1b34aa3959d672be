use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{CacheSettings, Capacity, Isolation, DEFAULT_CAPACITY};

/// Current-weather endpoint used when no provider URL is configured.
pub const DEFAULT_PROVIDER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub provider: ProviderConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Also write logs to this file
  pub log_file: Option<PathBuf>,
  /// SQLite database holding registered API keys (defaults to the data directory)
  pub key_db: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
  #[serde(default = "default_provider_url")]
  pub url: String,
  /// Per-request timeout
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ProviderConfig {
  fn default() -> Self {
    Self {
      url: default_provider_url(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_provider_url() -> String {
  DEFAULT_PROVIDER_URL.to_string()
}

fn default_timeout_secs() -> u64 {
  10
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_ttl_secs")]
  pub ttl_secs: u64,
  /// Entry limit per store, or `unbounded`
  #[serde(default, deserialize_with = "deserialize_capacity")]
  pub capacity: Capacity,
  #[serde(default = "default_refresh_period_secs")]
  pub refresh_period_secs: u64,
  #[serde(default = "default_shutdown_grace_secs")]
  pub shutdown_grace_secs: u64,
  #[serde(default)]
  pub isolation: Isolation,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_secs: default_ttl_secs(),
      capacity: Capacity::default(),
      refresh_period_secs: default_refresh_period_secs(),
      shutdown_grace_secs: default_shutdown_grace_secs(),
      isolation: Isolation::default(),
    }
  }
}

fn default_ttl_secs() -> u64 {
  60
}

fn default_refresh_period_secs() -> u64 {
  60
}

fn default_shutdown_grace_secs() -> u64 {
  5
}

fn deserialize_capacity<'de, D>(deserializer: D) -> Result<Capacity, D::Error>
where
  D: serde::Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Limit(usize),
    Keyword(String),
  }

  match Raw::deserialize(deserializer)? {
    Raw::Limit(n) => Ok(Capacity::Bounded(n)),
    Raw::Keyword(k) if k.eq_ignore_ascii_case("unbounded") => Ok(Capacity::Unbounded),
    Raw::Keyword(k) if k.eq_ignore_ascii_case("default") => Ok(Capacity::Bounded(DEFAULT_CAPACITY)),
    Raw::Keyword(k) => Err(serde::de::Error::custom(format!(
      "invalid capacity '{}': expected a number or 'unbounded'",
      k
    ))),
  }
}

impl CacheConfig {
  /// Validate and convert into engine settings.
  pub fn settings(&self) -> Result<CacheSettings> {
    if self.refresh_period_secs == 0 {
      return Err(eyre!("cache.refresh_period_secs must be greater than zero"));
    }
    if self.capacity == Capacity::Bounded(0) {
      return Err(eyre!("cache.capacity must be at least 1"));
    }

    Ok(CacheSettings {
      ttl: Duration::from_secs(self.ttl_secs),
      capacity: self.capacity,
      refresh_period: Duration::from_secs(self.refresh_period_secs),
      shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
      isolation: self.isolation,
    })
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./weathercache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/weathercache/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("weathercache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("weathercache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.cache.settings()?;
    Ok(config)
  }

  /// Get the provider API key from environment variables.
  ///
  /// Checks WEATHERCACHE_API_KEY first, then OPENWEATHER_API_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("WEATHERCACHE_API_KEY")
      .or_else(|_| std::env::var("OPENWEATHER_API_KEY"))
      .map_err(|_| {
        eyre!("API key not found. Pass --key or set WEATHERCACHE_API_KEY or OPENWEATHER_API_KEY.")
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_document_uses_defaults() {
    let config = Config::parse("{}").unwrap();
    let settings = config.cache.settings().unwrap();
    assert_eq!(settings.ttl, Duration::from_secs(60));
    assert_eq!(settings.capacity, Capacity::Bounded(10));
    assert_eq!(settings.refresh_period, Duration::from_secs(60));
    assert_eq!(settings.shutdown_grace, Duration::from_secs(5));
    assert_eq!(settings.isolation, Isolation::PerCredential);
    assert_eq!(config.provider.url, DEFAULT_PROVIDER_URL);
    assert!(config.key_db.is_none());
  }

  #[test]
  fn test_full_document() {
    let yaml = r#"
provider:
  url: http://localhost:8080/weather
  timeout_secs: 3
cache:
  ttl_secs: 30
  capacity: 25
  refresh_period_secs: 15
  isolation: global
log_file: /tmp/weathercache.log
"#;
    let config = Config::parse(yaml).unwrap();
    let settings = config.cache.settings().unwrap();
    assert_eq!(config.provider.url, "http://localhost:8080/weather");
    assert_eq!(config.provider.timeout_secs, 3);
    assert_eq!(settings.ttl, Duration::from_secs(30));
    assert_eq!(settings.capacity, Capacity::Bounded(25));
    assert_eq!(settings.refresh_period, Duration::from_secs(15));
    assert_eq!(settings.isolation, Isolation::Global);
    assert_eq!(config.log_file, Some(PathBuf::from("/tmp/weathercache.log")));
  }

  #[test]
  fn test_unbounded_capacity() {
    let config = Config::parse("cache:\n  capacity: unbounded\n  isolation: per-credential\n").unwrap();
    assert_eq!(config.cache.capacity, Capacity::Unbounded);
    assert_eq!(config.cache.isolation, Isolation::PerCredential);
  }

  #[test]
  fn test_invalid_capacity_keyword() {
    assert!(Config::parse("cache:\n  capacity: lots\n").is_err());
  }

  #[test]
  fn test_zero_refresh_period_rejected() {
    assert!(Config::parse("cache:\n  refresh_period_secs: 0\n").is_err());
  }

  #[test]
  fn test_zero_capacity_rejected() {
    assert!(Config::parse("cache:\n  capacity: 0\n").is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    assert!(Config::load(Some(Path::new("/definitely/not/here.yaml"))).is_err());
  }
}
