//! Backend selection.
//!
//! The storefront talks to a hosted backend when one is configured and falls
//! back to the local emulator otherwise. [`BackendConfig`] gathers the
//! settings from the environment; [`BackendConfig::mode`] makes the call.

use std::path::PathBuf;

pub const DEFAULT_STORAGE_PATH: &str = "wanderlust_mock_db";
pub const DEFAULT_STORAGE_KEY: &str = "wanderlust_mock_db_v1";

pub const ENV_URL: &str = "WANDERLUST_BACKEND_URL";
pub const ENV_ANON_KEY: &str = "WANDERLUST_BACKEND_ANON_KEY";
pub const ENV_STORAGE_PATH: &str = "WANDERLUST_STORAGE_PATH";
pub const ENV_STORAGE_KEY: &str = "WANDERLUST_STORAGE_KEY";

/// Ports of a local development backend; pointing at one means emulate.
const LOCAL_BACKEND_HOSTS: [&str; 2] = ["localhost:54321", "127.0.0.1:54321"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Emulated,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    /// Base path of the LMDB environment; `.lmdb` is appended.
    pub storage_path: PathBuf,
    pub storage_key: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl BackendConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from any variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            url: get(ENV_URL),
            anon_key: get(ENV_ANON_KEY),
            storage_path: get(ENV_STORAGE_PATH)
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            storage_key: get(ENV_STORAGE_KEY).unwrap_or(defaults.storage_key),
        }
    }

    pub fn mode(&self) -> BackendMode {
        let (Some(url), Some(_)) = (&self.url, &self.anon_key) else {
            return BackendMode::Emulated;
        };
        let url = url.to_lowercase();
        if LOCAL_BACKEND_HOSTS.iter().any(|host| url.contains(host)) {
            BackendMode::Emulated
        } else {
            BackendMode::Remote
        }
    }

    pub fn is_emulated(&self) -> bool {
        self.mode() == BackendMode::Emulated
    }
}
