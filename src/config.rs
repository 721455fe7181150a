//! Configuration surface: the recognized options for `init`/`open` and a
//! small on-disk application config the filesystem collaborator can load.

use crate::crypto::CipherId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const SERVER_URL_ENV: &str = "VAULT_SERVER_URL";

/// Application-level defaults, independent of any single vault. Not part of
/// the vault metadata format; this is the kind of thing a CLI front-end
/// would load once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Default directory new vaults are created under.
    pub default_vault_dir: PathBuf,

    /// Cipher used when `InitOptions::cipher` is not given.
    pub default_cipher: String,

    /// Escrow server URL used when neither `InitOptions`/`OpenOptions` nor
    /// `VAULT_SERVER_URL` supplies one.
    pub default_server_url: Option<String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            default_vault_dir: dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("vaultcore"),
            default_cipher: "aes256-gcm".to_string(),
            default_server_url: None,
        }
    }
}

impl VaultConfig {
    /// Resolves the server URL to use: an explicit per-call value, then
    /// `VAULT_SERVER_URL`, then this config's default.
    pub fn resolve_server_url(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(str::to_string)
            .or_else(|| std::env::var(SERVER_URL_ENV).ok())
            .or_else(|| self.default_server_url.clone())
    }
}

/// Options for `init`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_path: PathBuf,
    pub server_url: Option<String>,
    pub cipher: CipherId,
    pub noauth: bool,
}

impl InitOptions {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            server_url: None,
            cipher: CipherId::Aes256Gcm,
            noauth: false,
        }
    }

    pub fn with_cipher_name(mut self, name: &str) -> crate::error::Result<Self> {
        self.cipher = CipherId::from_name(name)?;
        Ok(self)
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn noauth(mut self) -> Self {
        self.noauth = true;
        self
    }

    /// Resolves the effective server URL against `config`'s defaults and the
    /// environment, honoring `noauth`.
    ///
    /// # Errors
    /// Returns [`crate::error::VaultError::MissingServer`] if `noauth` is
    /// unset and no URL can be resolved from any source.
    pub fn resolve_server_url(&self, config: &VaultConfig) -> crate::error::Result<Option<String>> {
        if self.noauth {
            return Ok(None);
        }
        config
            .resolve_server_url(self.server_url.as_deref())
            .map(Some)
            .ok_or(crate::error::VaultError::MissingServer)
    }
}

/// Options for `open`.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub base_path: PathBuf,
    pub server_url: Option<String>,
}

impl OpenOptions {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            server_url: None,
        }
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Resolves the effective server URL; returns `None` only when the
    /// caller ends up relying on a NOAUTH metadata record, which is decided
    /// later by the vault once it has read the `flags` byte.
    pub fn resolve_server_url(&self, config: &VaultConfig) -> Option<String> {
        config.resolve_server_url(self.server_url.as_deref())
    }
}
