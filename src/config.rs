//! Process configuration read from environment variables.

use std::time::Duration;
use thiserror::Error;

use crate::remote::DocumentPath;
use crate::storage::StorageConfig;
use crate::sync::SyncOptions;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings for the service binary
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Admin API listen port
    pub port: u16,
    /// Local sled database (cache slot + served documents)
    pub storage: StorageConfig,
    /// Remote document store; `None` means the local sled store is authoritative
    pub remote_store_url: Option<String>,
    pub remote_store_token: Option<String>,
    /// Object store for uploads; `None` keeps uploads in memory
    pub blob_base_url: Option<String>,
    /// Public prefix for uploaded files (defaults to `blob_base_url`)
    pub blob_public_url: Option<String>,
    pub blob_token: Option<String>,
    pub document: DocumentPath,
    pub request_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            storage: StorageConfig::default(),
            remote_store_url: None,
            remote_store_token: None,
            blob_base_url: None,
            blob_public_url: None,
            blob_token: None,
            document: DocumentPath::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl AppConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match var("PORT") {
            Some(raw) => parse("PORT", raw)?,
            None => defaults.port,
        };
        let request_timeout = match var("REQUEST_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(parse("REQUEST_TIMEOUT_MS", raw)?),
            None => defaults.request_timeout,
        };
        let storage = match var("STORAGE_PATH") {
            Some(path) => StorageConfig::new(path),
            None => defaults.storage,
        };
        let document = DocumentPath::new(
            var("CONFIG_COLLECTION").unwrap_or(defaults.document.collection),
            var("CONFIG_DOCUMENT").unwrap_or(defaults.document.key),
        );

        let blob_base_url = var("BLOB_BASE_URL");
        let blob_public_url = var("BLOB_PUBLIC_URL").or_else(|| blob_base_url.clone());

        Ok(Self {
            port,
            storage,
            remote_store_url: var("REMOTE_STORE_URL"),
            remote_store_token: var("REMOTE_STORE_TOKEN"),
            blob_base_url,
            blob_public_url,
            blob_token: var("BLOB_TOKEN"),
            document,
            request_timeout,
        })
    }

    /// Options for the config synchronizer
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions::new(self.document.clone()).with_request_timeout(self.request_timeout)
    }
}

fn parse<T>(var: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let parsed = raw.trim().parse::<T>();
    parsed.map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
        value: raw,
    })
}
