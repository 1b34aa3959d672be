use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::cache::CredentialValidator;

/// Schema for the API key registry.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS api_keys (
    api_key TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Outcome of registering a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
  Saved,
  AlreadyExists,
}

/// SQLite-backed registry of API keys allowed to use the cache.
pub struct KeyStore {
  conn: Mutex<Connection>,
}

impl KeyStore {
  /// Open or create the key database at `path`, or at the default location.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a throwaway in-memory key database.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("weathercache").join("keys.db"))
  }

  /// Register a key. Registering an existing key is not an error.
  pub fn save(&self, api_key: &str) -> Result<SaveOutcome> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let inserted = conn
      .execute(
        "INSERT OR IGNORE INTO api_keys (api_key) VALUES (?)",
        params![api_key],
      )
      .map_err(|e| eyre!("Failed to save API key: {}", e))?;

    if inserted == 0 {
      warn!("Attempt to save an existing API key");
      Ok(SaveOutcome::AlreadyExists)
    } else {
      info!("API key saved");
      Ok(SaveOutcome::Saved)
    }
  }

  /// Remove a key. Fails if the key was never registered.
  pub fn delete(&self, api_key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let deleted = conn
      .execute("DELETE FROM api_keys WHERE api_key = ?", params![api_key])
      .map_err(|e| eyre!("Failed to delete API key: {}", e))?;

    if deleted == 0 {
      return Err(eyre!("API key not found in the database"));
    }
    info!("API key deleted");
    Ok(())
  }

  pub fn contains(&self, api_key: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let found: Option<i64> = conn
      .query_row(
        "SELECT 1 FROM api_keys WHERE api_key = ?",
        params![api_key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up API key: {}", e))?;

    Ok(found.is_some())
  }
}

impl CredentialValidator for KeyStore {
  fn is_valid(&self, credential: &str) -> bool {
    match self.contains(credential) {
      Ok(found) => found,
      Err(e) => {
        warn!(error = %e, "Key lookup failed, rejecting request");
        false
      }
    }
  }
}
