//! Credential store — named-key secret save/load/delete.
//!
//! Backends:
//! - [`FileCredentialStore`] — JSON fallback at `credentials.json` with
//!   `0600` permissions
//! - [`MemoryCredentialStore`] — ephemeral, for tests and embedding
//! - macOS keychain backend via `security(1)` (macOS builds only)

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::utils;

/// Pluggable secret storage.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn save(&self, key: &str, value: &str) -> Result<(), EngineError>;
    async fn load(&self, key: &str) -> Result<Option<String>, EngineError>;
    async fn delete(&self, key: &str) -> Result<(), EngineError>;
}

// ─────────────────────────────────────────────
// File-backed fallback
// ─────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    version: u32,
    #[serde(default)]
    secrets: BTreeMap<String, String>,
}

/// File-backed credential store (`{version: 1, secrets: {...}}`).
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        FileCredentialStore { path }
    }

    /// Store at the default location (`~/.reefbot/credentials.json`).
    pub fn at_default_path() -> Self {
        Self::new(utils::get_data_path().join("credentials.json"))
    }

    fn read_file(&self) -> Result<CredentialFile, EngineError> {
        if !self.path.exists() {
            return Ok(CredentialFile {
                version: 1,
                secrets: BTreeMap::new(),
            });
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| EngineError::Unavailable(format!("cannot read credential file: {e}")))?;
        serde_json::from_str(&content)
            .map_err(|e| EngineError::Unavailable(format!("cannot parse credential file: {e}")))
    }

    fn write_file(&self, file: &CredentialFile) -> Result<(), EngineError> {
        utils::atomic_write_json(&self.path, file)
            .map_err(|e| EngineError::Unavailable(format!("cannot write credential file: {e}")))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn save(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let mut file = self.read_file()?;
        file.version = 1;
        file.secrets.insert(key.to_string(), value.to_string());
        self.write_file(&file)
    }

    async fn load(&self, key: &str) -> Result<Option<String>, EngineError> {
        Ok(self.read_file()?.secrets.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), EngineError> {
        let mut file = self.read_file()?;
        file.secrets.remove(key);
        self.write_file(&file)
    }
}

// ─────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────

/// Ephemeral credential store for tests and in-process embedding.
#[derive(Default)]
pub struct MemoryCredentialStore {
    secrets: RwLock<BTreeMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save(&self, key: &str, value: &str) -> Result<(), EngineError> {
        self.secrets
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<String>, EngineError> {
        Ok(self.secrets.read().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), EngineError> {
        self.secrets.write().unwrap().remove(key);
        Ok(())
    }
}

// ─────────────────────────────────────────────
// macOS keychain backend
// ─────────────────────────────────────────────

/// Keychain-backed store using `security(1)` generic passwords.
#[cfg(target_os = "macos")]
pub struct KeychainCredentialStore {
    account: String,
}

#[cfg(target_os = "macos")]
impl KeychainCredentialStore {
    pub fn new(account: impl Into<String>) -> Self {
        KeychainCredentialStore {
            account: account.into(),
        }
    }

    async fn run(args: &[&str]) -> Result<std::process::Output, EngineError> {
        tokio::process::Command::new("/usr/bin/security")
            .args(args)
            .output()
            .await
            .map_err(|e| EngineError::Unavailable(format!("security tool failed: {e}")))
    }
}

#[cfg(target_os = "macos")]
#[async_trait]
impl CredentialStore for KeychainCredentialStore {
    async fn save(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let output = Self::run(&[
            "add-generic-password",
            "-U",
            "-a",
            &self.account,
            "-s",
            key,
            "-w",
            value,
        ])
        .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(EngineError::Unavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    async fn load(&self, key: &str) -> Result<Option<String>, EngineError> {
        let output = Self::run(&[
            "find-generic-password",
            "-a",
            &self.account,
            "-s",
            key,
            "-w",
        ])
        .await?;
        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else {
            Ok(None)
        }
    }

    async fn delete(&self, key: &str) -> Result<(), EngineError> {
        let _ = Self::run(&["delete-generic-password", "-a", &self.account, "-s", key]).await?;
        Ok(())
    }
}
