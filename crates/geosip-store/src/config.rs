//! Store configuration.
//!
//! Deserialized from the `[store]` table of the application config file.
//! Every section has working defaults; an absent `[store.remote]` section
//! means the local backend is always used.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Placeholder shipped in example config files; treated as "no key".
pub const API_KEY_PLACEHOLDER: &str = "CHANGE_ME";

/// Legacy flat-storage key holding the serialized record sequence.
pub const LEGACY_RECORDS_KEY: &str = "geosip_land_records";

/// Path value that selects an in-memory local database.
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Default data directory: `<data_dir>/geosip`.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("geosip")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub local: LocalConfig,
    pub remote: Option<RemoteConfig>,
    pub legacy: LegacyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// SQLite file, or `:memory:`.
    pub path: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("geosip.db"),
        }
    }
}

impl LocalConfig {
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(IN_MEMORY_PATH),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY_PATH
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub project: String,
    pub api_key: String,
    /// Transport timeout for every request.
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            project: "geosip".into(),
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    /// A URL and a real API key are both present.
    pub fn is_configured(&self) -> bool {
        let key = self.api_key.trim();
        !self.base_url.trim().is_empty() && !key.is_empty() && key != API_KEY_PLACEHOLDER
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    /// Directory holding `<key>.json` blobs.
    pub dir: PathBuf,
    pub key: String,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir().join("legacy"),
            key: LEGACY_RECORDS_KEY.into(),
        }
    }
}

impl StoreConfig {
    /// Configuration for tests and throwaway sessions: in-memory local
    /// backend, no remote.
    pub fn in_memory() -> Self {
        Self {
            local: LocalConfig::in_memory(),
            ..Default::default()
        }
    }

    /// The remote section, if it is usable.
    pub fn remote_if_configured(&self) -> Option<&RemoteConfig> {
        self.remote.as_ref().filter(|r| r.is_configured())
    }

    /// Apply `GEOSIP_*` environment overrides through `lookup`.
    ///
    /// Takes a lookup function rather than reading the process environment
    /// directly so callers and tests can supply their own.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("GEOSIP_DB_PATH") {
            self.local.path = PathBuf::from(path);
        }

        let url = lookup("GEOSIP_REMOTE_URL");
        let key = lookup("GEOSIP_REMOTE_API_KEY");
        let project = lookup("GEOSIP_REMOTE_PROJECT");
        if url.is_none() && key.is_none() && project.is_none() {
            return;
        }

        let remote = self.remote.get_or_insert_with(RemoteConfig::default);
        if let Some(url) = url {
            remote.base_url = url;
        }
        if let Some(key) = key {
            remote.api_key = key;
        }
        if let Some(project) = project {
            remote.project = project;
        }
    }
}
