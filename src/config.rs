// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::watcher::PollSettings;

/// Default seconds between two polls of the watched folder.
pub const DEFAULT_POLL_INTERVAL: u64 = 600;

/// Default recency window: only files created this many seconds before a
/// poll are treated as new.
pub const DEFAULT_FRESHNESS_WINDOW: u64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanpostConfig {
    /// Folder to watch. Relative names resolve under the app root.
    pub watch_folder: String,

    /// Seconds to sleep between polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Seconds after creation during which a file counts as new
    #[serde(default = "default_freshness_window")]
    pub freshness_window: u64,

    /// Where documents are downloaded to (default: current directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,

    /// Leave the remote file in place when publishing it failed
    #[serde(default)]
    pub keep_on_publish_failure: bool,

    /// Append logs to this file instead of stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    pub baidu: BaiduConfig,

    pub wordpress: WordPressConfig,
}

/// Baidu Pan application credentials and OAuth tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct BaiduConfig {
    pub api_key: String,
    pub secret_key: String,
    /// May be left empty; a new one is fetched with the refresh token.
    #[serde(default)]
    pub access_token: String,
    pub refresh_token: String,
}

/// Connection parameters and post defaults for the WordPress database.
#[derive(Clone, Serialize, Deserialize)]
pub struct WordPressConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub user: String,

    pub password: String,

    pub database: String,

    /// Table prefix chosen at WordPress install time
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    /// Base of the guid given to new posts
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// User id recorded as the author of new posts
    #[serde(default = "default_author_id")]
    pub author_id: u64,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL
}

fn default_freshness_window() -> u64 {
    DEFAULT_FRESHNESS_WINDOW
}

fn default_port() -> u16 {
    3306
}

fn default_table_prefix() -> String {
    "wp_".to_string()
}

fn default_site_url() -> String {
    "https://www.example.com".to_string()
}

fn default_author_id() -> u64 {
    1
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

impl fmt::Debug for BaiduConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaiduConfig")
            .field("api_key", &self.api_key)
            .field("secret_key", &redact(&self.secret_key))
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

impl fmt::Debug for WordPressConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WordPressConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("database", &self.database)
            .field("table_prefix", &self.table_prefix)
            .field("site_url", &self.site_url)
            .field("author_id", &self.author_id)
            .finish()
    }
}

impl WordPressConfig {
    /// Build a config with the given connection parameters and default
    /// port, prefix, site url and author.
    pub fn new(host: String, user: String, password: String, database: String) -> Self {
        Self {
            host,
            port: default_port(),
            user,
            password,
            database,
            table_prefix: default_table_prefix(),
            site_url: default_site_url(),
            author_id: default_author_id(),
        }
    }
}

impl PanpostConfig {
    /// Build a config from the nine values collected at the prompt. All
    /// other settings take their defaults.
    pub fn new(watch_folder: String, baidu: BaiduConfig, wordpress: WordPressConfig) -> Self {
        Self {
            watch_folder,
            poll_interval: default_poll_interval(),
            freshness_window: default_freshness_window(),
            download_dir: None,
            keep_on_publish_failure: false,
            log_file: None,
            baidu,
            wordpress,
        }
    }

    /// Derive the loop settings, resolving the download directory against
    /// `work_dir` when it is unset or relative.
    pub fn poll_settings(&self, work_dir: &Path) -> PollSettings {
        let download_dir = match &self.download_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => work_dir.join(dir),
            None => work_dir.to_path_buf(),
        };
        PollSettings {
            folder: self.watch_folder.clone(),
            freshness_window: self.freshness_window,
            poll_interval: Duration::from_secs(self.poll_interval),
            download_dir,
            keep_on_publish_failure: self.keep_on_publish_failure,
        }
    }
}

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join("panpost.toml")
}

pub fn load_config(path: &Path) -> Result<Option<PanpostConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: PanpostConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(config))
}

pub fn save_config(path: &Path, config: &PanpostConfig) -> Result<()> {
    let toml = toml::to_string_pretty(config)?;
    std::fs::write(path, toml)?;
    Ok(())
}

/// Write rotated Baidu tokens into the config file at `path`, leaving every
/// other setting as it is on disk.
pub fn save_tokens(path: &Path, access_token: &str, refresh_token: &str) -> Result<()> {
    let mut config = load_config(path)?
        .ok_or_else(|| anyhow!("{} no longer exists", path.display()))?;
    config.baidu.access_token = access_token.to_string();
    config.baidu.refresh_token = refresh_token.to_string();
    save_config(path, &config)
        .with_context(|| format!("Failed to write tokens to {}", path.display()))
}
