//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! auth service base URL, request timeout, inactivity timings and where
//! the session is persisted.
//!
//! Configuration is stored at `~/.config/sessionkit/config.json`.
//! `SESSIONKIT_API_BASE_URL` and `SESSIONKIT_API_TIMEOUT_MS` override the
//! file values.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::store::{FileSessionStore, KeyringSessionStore, SessionStore, DEFAULT_NAMESPACE};

/// Application name used for config/data directory paths
const APP_NAME: &str = "sessionkit";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_API_BASE_URL: &str = "SESSIONKIT_API_BASE_URL";
pub const ENV_API_TIMEOUT_MS: &str = "SESSIONKIT_API_TIMEOUT_MS";

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// 15 minutes without interaction before forced logout
const DEFAULT_INACTIVITY_TIMEOUT_SECS: u64 = 900;

/// Warning dialog appears for the final minute
const DEFAULT_INACTIVITY_WARNING_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub inactivity_timeout_secs: u64,
    pub inactivity_warning_secs: u64,
    pub storage_namespace: String,
    pub storage_backend: StorageBackend,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            inactivity_timeout_secs: DEFAULT_INACTIVITY_TIMEOUT_SECS,
            inactivity_warning_secs: DEFAULT_INACTIVITY_WARNING_SECS,
            storage_namespace: DEFAULT_NAMESPACE.to_string(),
            storage_backend: StorageBackend::File,
            last_email: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from a key lookup (the process environment in `load`)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_BASE_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(raw) = lookup(ENV_API_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.request_timeout_ms = ms,
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_API_TIMEOUT_MS),
            }
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the file-backed session record
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Open the configured session store
    pub fn session_store(&self) -> Result<Arc<dyn SessionStore>> {
        let store: Arc<dyn SessionStore> = match self.storage_backend {
            StorageBackend::File => {
                Arc::new(FileSessionStore::new(self.data_dir()?, &self.storage_namespace))
            }
            StorageBackend::Keyring => {
                Arc::new(KeyringSessionStore::new(self.storage_namespace.clone()))
            }
        };
        Ok(store)
    }
}
