use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Bearer credential issued at sign-in.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
  pub access: String,
  pub refresh: Option<String>,
}

impl Credential {
  pub fn new(access: impl Into<String>, refresh: Option<String>) -> Self {
    Self {
      access: access.into(),
      refresh,
    }
  }

  /// Short, non-reversible identifier safe to log.
  pub fn fingerprint(&self) -> String {
    let digest = Sha256::digest(self.access.as_bytes());
    hex::encode(&digest[..6])
  }
}

impl fmt::Debug for Credential {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Credential")
      .field("fingerprint", &self.fingerprint())
      .field("has_refresh", &self.refresh.is_some())
      .finish()
  }
}

/// Where the signed-in credential is kept between runs.
///
/// The store may be shared with other processes; the session gate re-reads
/// it on `sync_credentials`.
pub trait CredentialStore: Send + Sync {
  fn load(&self) -> Result<Option<Credential>>;
  fn save(&self, credential: &Credential) -> Result<()>;
  fn clear(&self) -> Result<()>;
}

/// Process-local store, used by tests and `credential_store: memory`.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
  credential: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_credential(credential: Credential) -> Self {
    Self {
      credential: Mutex::new(Some(credential)),
    }
  }
}

impl CredentialStore for MemoryCredentialStore {
  fn load(&self) -> Result<Option<Credential>> {
    Ok(
      self
        .credential
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone(),
    )
  }

  fn save(&self, credential: &Credential) -> Result<()> {
    *self.credential.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    *self.credential.lock().unwrap_or_else(PoisonError::into_inner) = None;
    Ok(())
  }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  access TEXT NOT NULL,
  refresh TEXT,
  saved_at TEXT NOT NULL
);
"#;

/// SQLite-backed store in the platform data directory.
pub struct SqliteCredentialStore {
  conn: Mutex<Connection>,
  path: PathBuf,
}

impl SqliteCredentialStore {
  /// Open or create the store at the default location
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create credential directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open credential store at {}: {}", path.display(), e))?;
    conn
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
      path: path.to_path_buf(),
    })
  }

  /// Get the default store path
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("ticketdesk").join("session.db"))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl fmt::Debug for SqliteCredentialStore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SqliteCredentialStore")
      .field("path", &self.path)
      .finish_non_exhaustive()
  }
}

impl CredentialStore for SqliteCredentialStore {
  fn load(&self) -> Result<Option<Credential>> {
    let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
    conn
      .query_row(
        "SELECT access, refresh FROM credentials WHERE id = 1",
        [],
        |row| Ok(Credential::new(row.get::<_, String>(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read credential: {}", e))
  }

  fn save(&self, credential: &Credential) -> Result<()> {
    let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
    conn
      .execute(
        "INSERT INTO credentials (id, access, refresh, saved_at) VALUES (1, ?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET access = excluded.access, refresh = excluded.refresh,
           saved_at = excluded.saved_at",
        params![
          credential.access,
          credential.refresh,
          chrono::Utc::now().to_rfc3339()
        ],
      )
      .map_err(|e| eyre!("Failed to save credential: {}", e))?;
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
    conn
      .execute("DELETE FROM credentials", [])
      .map_err(|e| eyre!("Failed to clear credential: {}", e))?;
    Ok(())
  }
}
