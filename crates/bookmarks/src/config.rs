//! Service configuration
//!
//! Loaded in order of priority:
//! 1. An explicit JSON file (`--config <path>` or `BOOKMARKS_CONFIG`)
//! 2. `bookmarks.json` in the config directory (~/.config/bookmarks/)
//! 3. Built-in defaults
//!
//! Environment variables then override single values.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::storage::HostedConfig;

/// Config filename in the bookmarks config directory
pub const CONFIG_FILE: &str = "bookmarks.json";

/// Default location of the embedded index
pub const DEFAULT_INDEX_PATH: &str = "bookmarks.index";

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Top-level configuration file format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub index: IndexSection,
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub address: SocketAddr,
    /// Directory holding the front-end bundle; nothing is served when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            static_dir: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Index section as written in the file: at most one backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosted: Option<HostedConfig>,
}

/// The selected index backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexConfig {
    /// Embedded index in a local directory
    Local { path: PathBuf },
    /// Hosted search service
    Hosted(HostedConfig),
}

impl ServiceConfig {
    /// Load configuration using the priority described in the module docs,
    /// then apply environment overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env: Option<PathBuf> = config::env_var("BOOKMARKS_CONFIG")?;
        let mut cfg: ServiceConfig = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => config::load_json_file(&path)?,
            None => config::load_optional(CONFIG_FILE)?.unwrap_or_default(),
        };
        cfg.apply_overrides(config::env_var::<String>)?;
        cfg.index_config()?;
        Ok(cfg)
    }

    /// Override values from variables returned by `var`
    pub fn apply_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Result<Option<String>>,
    {
        if let Some(address) = var("BOOKMARKS_ADDR")? {
            self.server.address = address
                .parse()
                .with_context(|| format!("Invalid value for BOOKMARKS_ADDR: {}", address))?;
        }
        if let Some(dir) = var("BOOKMARKS_STATIC_DIR")? {
            self.server.static_dir = Some(PathBuf::from(dir));
        }
        if let Some(timeout) = var("BOOKMARKS_REQUEST_TIMEOUT_MS")? {
            self.server.request_timeout_ms = timeout.parse().with_context(|| {
                format!("Invalid value for BOOKMARKS_REQUEST_TIMEOUT_MS: {}", timeout)
            })?;
        }
        if let Some(path) = var("BOOKMARKS_INDEX_PATH")? {
            self.index.path = Some(PathBuf::from(path));
        }

        let app_id = var("BOOKMARKS_HOSTED_APP_ID")?;
        let api_key = var("BOOKMARKS_HOSTED_API_KEY")?;
        let index_name = var("BOOKMARKS_HOSTED_INDEX")?;
        match (app_id, api_key, index_name) {
            (None, None, None) => {}
            (Some(app_id), Some(api_key), Some(index_name)) => {
                let base_url = self.index.hosted.take().and_then(|h| h.base_url);
                self.index.hosted = Some(HostedConfig {
                    app_id,
                    api_key,
                    index_name,
                    base_url,
                });
            }
            _ => bail!(
                "BOOKMARKS_HOSTED_APP_ID, BOOKMARKS_HOSTED_API_KEY and BOOKMARKS_HOSTED_INDEX must be set together"
            ),
        }
        Ok(())
    }

    /// Resolve the index backend; configuring both is an error
    pub fn index_config(&self) -> Result<IndexConfig> {
        match (&self.index.path, &self.index.hosted) {
            (Some(_), Some(_)) => {
                bail!("Configure either index.path or index.hosted, not both")
            }
            (_, Some(hosted)) => Ok(IndexConfig::Hosted(hosted.clone())),
            (Some(path), None) => Ok(IndexConfig::Local { path: path.clone() }),
            (None, None) => Ok(IndexConfig::Local {
                path: PathBuf::from(DEFAULT_INDEX_PATH),
            }),
        }
    }
}
