use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use weathercache::cache::RefreshMode;
use weathercache::config::Config;
use weathercache::db::{KeyStore, SaveOutcome};
use weathercache::logging;
use weathercache::weather::CachedWeatherClient;
use weathercache::Error;

#[derive(Parser, Debug)]
#[command(name = "weathercache")]
#[command(about = "Caching front for a weather provider")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/weathercache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch current weather for one or more cities
  Get {
    #[arg(required = true)]
    cities: Vec<String>,

    /// API key (default: $WEATHERCACHE_API_KEY or $OPENWEATHER_API_KEY)
    #[arg(short, long)]
    key: Option<String>,

    /// "polling" keeps cached cities fresh in the background; anything else fetches on demand
    #[arg(short, long, default_value = "on-demand")]
    mode: String,

    /// Number of rounds to run
    #[arg(long, default_value_t = 1)]
    repeat: u32,

    /// Seconds between rounds
    #[arg(long, default_value_t = 30)]
    every: u64,
  },

  /// Manage registered API keys
  Keys {
    #[command(subcommand)]
    action: KeysAction,
  },
}

#[derive(Subcommand, Debug)]
enum KeysAction {
  /// Register an API key
  Add { key: String },
  /// Unregister an API key
  Remove { key: String },
  /// Check whether an API key is registered
  Check { key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _logging = logging::init_logging(config.log_file.as_deref())?;

  let keys = Arc::new(KeyStore::open(config.key_db.as_deref())?);

  match args.command {
    Command::Get {
      cities,
      key,
      mode,
      repeat,
      every,
    } => {
      let key = match key {
        Some(k) => k,
        None => Config::get_api_key()?,
      };
      run_get(&config, keys, &cities, &key, RefreshMode::from(mode.as_str()), repeat, every).await
    }
    Command::Keys { action } => run_keys(&keys, action),
  }
}

async fn run_get(
  config: &Config,
  keys: Arc<KeyStore>,
  cities: &[String],
  key: &str,
  mode: RefreshMode,
  repeat: u32,
  every: u64,
) -> Result<()> {
  let client = CachedWeatherClient::from_config(config, keys)?;

  for round in 0..repeat.max(1) {
    if round > 0 {
      tokio::time::sleep(Duration::from_secs(every)).await;
    }

    let results = match client.get_many::<Value>(cities, key, mode).await {
      Ok(results) => results,
      Err(Error::CredentialInvalid) => {
        return Err(eyre!(
          "API key is not registered. Register it with `weathercache keys add <key>`."
        ))
      }
      Err(e) => return Err(e.into()),
    };
    for item in results {
      let line = match item.result {
        Ok(found) => json!({
          "city": item.city,
          "source": found.source.as_str(),
          "fetched_at": found.fetched_at,
          "data": found.data,
        }),
        Err(e) => json!({
          "city": item.city,
          "error": e.to_string(),
        }),
      };
      println!("{}", line);
    }
  }

  client.shutdown().await;
  Ok(())
}

fn run_keys(keys: &KeyStore, action: KeysAction) -> Result<()> {
  match action {
    KeysAction::Add { key } => match keys.save(&key)? {
      SaveOutcome::Saved => println!("API key saved."),
      SaveOutcome::AlreadyExists => println!("API key already exists."),
    },
    KeysAction::Remove { key } => {
      keys.delete(&key)?;
      println!("API key deleted.");
    }
    KeysAction::Check { key } => {
      if keys.contains(&key)? {
        println!("API key is registered.");
      } else {
        println!("API key is not registered.");
      }
    }
  }
  Ok(())
}
