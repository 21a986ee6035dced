//! Persistence for the current session.
//!
//! A store holds a single namespaced record `{user, accessToken,
//! refreshToken?, savedAt}`. It is written on every session mutation
//! and read once at hydrate time.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SessionData;

/// Keychain service name
const SERVICE_NAME: &str = "sessionkit";

/// Default record key, shared by every backend
pub const DEFAULT_NAMESPACE: &str = "auth-storage";

pub trait SessionStore: Send + Sync {
    /// Read the persisted session, if any
    fn load(&self) -> Result<Option<SessionData>>;

    /// Replace the persisted session
    fn save(&self, data: &SessionData) -> Result<()>;

    /// Remove the persisted session. Clearing an empty store is not an error.
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    #[serde(flatten)]
    session: SessionData,
    #[serde(rename = "savedAt")]
    saved_at: DateTime<Utc>,
}

fn encode(data: &SessionData) -> Result<String> {
    let record = StoredSession {
        session: data.clone(),
        saved_at: Utc::now(),
    };
    serde_json::to_string_pretty(&record).context("Failed to serialize session")
}

fn decode(contents: &str) -> Result<SessionData> {
    let record: StoredSession =
        serde_json::from_str(contents).context("Failed to parse session record")?;
    Ok(record.session)
}

// ============================================================================
// File
// ============================================================================

/// JSON file at `<dir>/<namespace>.json`
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl AsRef<Path>, namespace: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", namespace)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<SessionData>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents =
            std::fs::read_to_string(&self.path).context("Failed to read session file")?;
        let data = decode(&contents)?;
        debug!(path = %self.path.display(), "Session loaded from file");
        Ok(Some(data))
    }

    fn save(&self, data: &SessionData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create session directory")?;
        }
        std::fs::write(&self.path, encode(data)?).context("Failed to write session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

// ============================================================================
// OS keychain
// ============================================================================

/// Stores the serialized record as the keychain secret for `namespace`
pub struct KeyringSessionStore {
    namespace: String,
}

impl KeyringSessionStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.namespace).context("Failed to create keyring entry")
    }
}

impl SessionStore for KeyringSessionStore {
    fn load(&self) -> Result<Option<SessionData>> {
        match self.entry()?.get_password() {
            Ok(contents) => decode(&contents).map(Some),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve session from keychain"),
        }
    }

    fn save(&self, data: &SessionData) -> Result<()> {
        self.entry()?
            .set_password(&encode(data)?)
            .context("Failed to store session in keychain")
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}

// ============================================================================
// In memory
// ============================================================================

/// Keeps the encoded record in memory. Useful for tests and for clients
/// that must not persist credentials.
#[derive(Default)]
pub struct MemorySessionStore {
    record: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw persisted record (for inspection)
    pub fn raw(&self) -> Option<String> {
        self.record.lock().ok().and_then(|r| r.clone())
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<SessionData>> {
        let record = self
            .record
            .lock()
            .map_err(|_| anyhow::anyhow!("Session store lock poisoned"))?;
        record.as_deref().map(decode).transpose()
    }

    fn save(&self, data: &SessionData) -> Result<()> {
        let encoded = encode(data)?;
        let mut record = self
            .record
            .lock()
            .map_err(|_| anyhow::anyhow!("Session store lock poisoned"))?;
        *record = Some(encoded);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut record = self
            .record
            .lock()
            .map_err(|_| anyhow::anyhow!("Session store lock poisoned"))?;
        *record = None;
        Ok(())
    }
}
