//! Application configuration.
//!
//! Loaded from `<config_dir>/geosip/config.toml` unless a path is given. A
//! missing file means defaults throughout. `GEOSIP_*` environment variables
//! override the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use geosip_store::StoreConfig;

use crate::grouping::DEFAULT_PAGE_SIZE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Default config file location.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("geosip").join("config.toml"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeosipConfig {
    /// Groups per page when browsing.
    pub page_size: usize,
    pub store: StoreConfig,
    pub admin: AdminConfig,
}

impl Default for GeosipConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            store: StoreConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

/// The super-admin account created on first run.
///
/// There is no default password: until one is set here or through
/// `GEOSIP_ADMIN_PASSWORD`, no super-admin is created.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: "admin".into(),
            email: "admin@localhost".into(),
            password: String::new(),
        }
    }
}

impl AdminConfig {
    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl GeosipConfig {
    /// Parse TOML text.
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path`, or the default location when `None`. A file that does
    /// not exist yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => {
                    info!("no config directory available, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml(&text, &path)?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// [`load`](Self::load) followed by overrides from the process
    /// environment.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `GEOSIP_*` overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.store.apply_env(&lookup);
        if let Some(password) = lookup("GEOSIP_ADMIN_PASSWORD") {
            self.admin.password = password;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".into()));
        }
        if self.admin.username.trim().is_empty() {
            return Err(ConfigError::Invalid("admin.username must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_defaults() {
        let config = GeosipConfig::from_toml("", Path::new("config.toml")).unwrap();
        assert_eq!(config, GeosipConfig::default());
        assert_eq!(config.page_size, 10);
    }

    #[test]
    fn test_full_file() {
        let text = r#"
            page_size = 25

            [store.local]
            path = ":memory:"

            [store.remote]
            base_url = "https://records.example.org"
            project = "survey"
            api_key = "CHANGE_ME"

            [store.legacy]
            dir = "/var/lib/geosip/legacy"

            [admin]
            username = "kades"
            email = "kades@desa.id"
            password = "s3cret"
        "#;
        let config = GeosipConfig::from_toml(text, Path::new("config.toml")).unwrap();
        assert_eq!(config.page_size, 25);
        assert!(config.store.local.is_in_memory());
        assert_eq!(config.store.remote.as_ref().unwrap().timeout_secs, 10);
        assert!(config.store.remote_if_configured().is_none());
        assert_eq!(config.store.legacy.key, "geosip_land_records");
        assert_eq!(config.admin.username, "kades");
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let err = GeosipConfig::from_toml("page_size = 0", Path::new("c.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_bad_toml_names_path() {
        let err = GeosipConfig::from_toml("page_size = [", Path::new("bad.toml")).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_missing_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GeosipConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, GeosipConfig::default());
    }

    #[test]
    fn test_no_default_admin_password() {
        let config = GeosipConfig::from_toml("[admin]\nusername = \"kades\"", Path::new("c.toml")).unwrap();
        assert!(!config.admin.has_password());
        assert!(!GeosipConfig::default().admin.has_password());
    }

    #[test]
    fn test_admin_password_env_override() {
        let mut config = GeosipConfig::default();
        config.apply_env(|k| (k == "GEOSIP_ADMIN_PASSWORD").then(|| "from-env".to_string()));
        assert_eq!(config.admin.password, "from-env");
        assert!(!format!("{:?}", config.admin).contains("from-env"));
    }
}
