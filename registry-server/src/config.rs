//! # Configuration Management
//!
//! The server reads one JSON file at startup. Keys are kebab-case:
//!
//! ```json
//! {
//!   "host": "0.0.0.0",
//!   "port": 8080,
//!   "url": "http://localhost:8080",
//!   "user-keys": ["secret-publish-key"],
//!   "db-path": "./registry.db",
//!   "storage-driver": "fs",
//!   "storage-driver-opts": { "base-dir": "./storage" },
//!   "max-body-size-mb": 150
//! }
//! ```
//!
//! Missing keys fall back to the defaults shown above (with an empty
//! `user-keys` list, so nobody can publish until a key is configured).
//! [`Config::load_or_init`] writes the defaults to disk when the file does
//! not exist yet.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Server configuration, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Address to bind to
    pub host: String,
    pub port: u16,
    /// Public base URL used to build tarball links
    pub url: String,
    /// Bearer tokens allowed to publish
    pub user_keys: Vec<String>,
    /// SQLite database file
    pub db_path: PathBuf,
    /// Storage backend name (`fs` or `memory`)
    pub storage_driver: String,
    /// Backend specific options, e.g. `base-dir` for `fs`
    pub storage_driver_opts: BTreeMap<String, String>,
    /// Upper bound for request bodies, publish documents included
    pub max_body_size_mb: usize,
}

impl Default for Config {
    fn default() -> Self {
        let mut storage_driver_opts = BTreeMap::new();
        storage_driver_opts.insert("base-dir".to_string(), "./storage".to_string());

        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            url: "http://localhost:8080".to_string(),
            user_keys: Vec::new(),
            db_path: PathBuf::from("./registry.db"),
            storage_driver: "fs".to_string(),
            storage_driver_opts,
            max_body_size_mb: 150,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. Fails if the file is missing.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            serde_json::from_str(&config_str).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.normalized()
    }

    /// Load configuration, writing the defaults to `path` first when the
    /// file does not exist.
    pub fn load_or_init<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }

        let config = Self::default();
        config.save(path)?;
        info!(path = %path.display(), "Wrote default configuration");
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, contents).map_err(io_err)
    }

    fn normalized(mut self) -> Result<Self, ConfigError> {
        let url = url::Url::parse(&self.url)
            .map_err(|e| ConfigError::Invalid(format!("url \"{}\": {}", self.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "url \"{}\" must use http or https",
                self.url
            )));
        }

        self.url = self.url.trim_end_matches('/').to_string();
        self.user_keys.retain(|key| !key.is_empty());
        Ok(self)
    }

    /// Public base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Get the maximum request body size in bytes.
    pub fn max_body_size_bytes(&self) -> usize {
        self.max_body_size_mb.saturating_mul(1024 * 1024)
    }

    /// Whether `key` may publish
    pub fn is_authorized(&self, key: &str) -> bool {
        !key.is_empty() && self.user_keys.iter().any(|k| k == key)
    }
}
