//! Application configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! includes the scoring service URL, request timeouts, the credential storage
//! backend and the last used username.
//!
//! Configuration is stored at `~/.config/safeguard/config.json`. Every field
//! is optional; environment variables override whatever the file says.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{CredentialStore, FileBackend, KeyringBackend, MemoryBackend};

/// Application name used for config/data directory paths
const APP_NAME: &str = "safeguard";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Scoring service used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Fixed budget for a single outbound request, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Upper bound on the best-effort remote logout notify, in seconds.
pub const DEFAULT_LOGOUT_TIMEOUT_SECS: u64 = 5;

pub const ENV_API_URL: &str = "SAFEGUARD_API_URL";
pub const ENV_TIMEOUT_SECS: &str = "SAFEGUARD_TIMEOUT_SECS";
pub const ENV_CREDENTIAL_BACKEND: &str = "SAFEGUARD_CREDENTIAL_BACKEND";

/// Where the credential triple is persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// JSON key/value file in the data directory
    #[default]
    File,
    /// OS keychain, one entry per key
    Keyring,
    /// Process-local only; nothing survives a restart
    Memory,
}

impl FromStr for CredentialBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" | "keychain" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("Unknown credential backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub logout_timeout_secs: Option<u64>,
    pub credential_backend: Option<CredentialBackend>,
    pub last_username: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
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

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory the file credential backend writes to.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Apply `SAFEGUARD_*` environment variables on top of the file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup(ENV_API_URL) {
            self.api_base_url = Some(url);
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            let secs = secs
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds", ENV_TIMEOUT_SECS))?;
            self.request_timeout_secs = Some(secs);
        }
        if let Some(backend) = lookup(ENV_CREDENTIAL_BACKEND) {
            self.credential_backend = Some(backend.parse()?);
        }
        Ok(())
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_API_URL)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .filter(|&secs| secs > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn logout_timeout(&self) -> Duration {
        Duration::from_secs(
            self.logout_timeout_secs
                .filter(|&secs| secs > 0)
                .unwrap_or(DEFAULT_LOGOUT_TIMEOUT_SECS),
        )
    }

    pub fn credential_backend(&self) -> CredentialBackend {
        self.credential_backend.unwrap_or_default()
    }

    /// Build the credential store for the configured backend.
    pub fn open_credential_store(&self) -> Result<CredentialStore> {
        let store = match self.credential_backend() {
            CredentialBackend::File => {
                CredentialStore::new(FileBackend::new(self.data_dir()?))
            }
            CredentialBackend::Keyring => CredentialStore::new(KeyringBackend::new(APP_NAME)),
            CredentialBackend::Memory => CredentialStore::new(MemoryBackend::default()),
        };
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url(), DEFAULT_API_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.logout_timeout(), Duration::from_secs(5));
        assert_eq!(config.credential_backend(), CredentialBackend::File);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = Config {
            api_base_url: Some("https://api.example.test/".to_string()),
            ..Config::default()
        };
        assert_eq!(config.api_base_url(), "https://api.example.test");
    }

    #[test]
    fn test_zero_timeout_falls_back_to_default() {
        let config = Config {
            request_timeout_secs: Some(0),
            ..Config::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config {
            api_base_url: Some("http://file.example".to_string()),
            ..Config::default()
        };
        config
            .apply_overrides(env(&[
                (ENV_API_URL, "http://env.example"),
                (ENV_TIMEOUT_SECS, " 30 "),
                (ENV_CREDENTIAL_BACKEND, "Keyring"),
            ]))
            .expect("valid overrides");

        assert_eq!(config.api_base_url(), "http://env.example");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.credential_backend(), CredentialBackend::Keyring);
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[(ENV_API_URL, "  ")]))
            .expect("empty override is ignored");
        assert_eq!(config.api_base_url, None);
    }

    #[test]
    fn test_invalid_timeout_override_rejected() {
        let mut config = Config::default();
        let result = config.apply_overrides(env(&[(ENV_TIMEOUT_SECS, "soon")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("file".parse::<CredentialBackend>().unwrap(), CredentialBackend::File);
        assert_eq!("KEYCHAIN".parse::<CredentialBackend>().unwrap(), CredentialBackend::Keyring);
        assert_eq!("memory".parse::<CredentialBackend>().unwrap(), CredentialBackend::Memory);
        assert!("redis".parse::<CredentialBackend>().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let config = Config {
            api_base_url: Some("https://scan.example".to_string()),
            credential_backend: Some(CredentialBackend::Memory),
            last_username: Some("demo@safeguard.ai".to_string()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(loaded, Config::default());
    }
}
