//! Bot configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub wiki: WikiConfig,
    #[serde(default)]
    pub bot: BotConfig,
}

/// Connection to the MediaWiki API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiConfig {
    /// `api.php` endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Bot password login name (`Account@BotName`)
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Per-request timeout; unset means requests wait indefinitely
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl WikiConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            user_agent: default_user_agent(),
            username: None,
            password: None,
            request_timeout_secs: None,
        }
    }
}

/// Reconciliation behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Noticeboards, processed in this order every pass
    #[serde(default = "default_pages")]
    pub pages: Vec<String>,

    /// Page listing sensitive IP ranges and watched categories
    #[serde(default = "default_special_ips_page")]
    pub special_ips_page: String,

    /// Value of the `bot` argument on backlog indicators
    #[serde(default = "default_identity")]
    pub identity: String,

    /// Page explaining restriction flag abbreviations
    #[serde(default = "default_legend_page")]
    pub legend_page: String,

    /// Pause between passes in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Check revisions but never write
    #[serde(default)]
    pub dry_run: bool,
}

impl BotConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            pages: default_pages(),
            special_ips_page: default_special_ips_page(),
            identity: default_identity(),
            legend_page: default_legend_page(),
            poll_interval_secs: default_poll_interval(),
            dry_run: false,
        }
    }
}

// Defaults
fn default_api_url() -> String { "https://en.wikipedia.org/w/api.php".to_string() }
fn default_user_agent() -> String {
    format!("aiv-helperbot/{} (noticeboard maintenance)", env!("CARGO_PKG_VERSION"))
}
fn default_pages() -> Vec<String> {
    vec![
        "Wikipedia:Administrator intervention against vandalism".to_string(),
        "Wikipedia:Administrator intervention against vandalism/TB2".to_string(),
        "Wikipedia:Usernames for administrator attention".to_string(),
        "Wikipedia:Usernames for administrator attention/Bot".to_string(),
    ]
}
fn default_special_ips_page() -> String { "User:HBC AIV helperbot/Special IPs".to_string() }
fn default_identity() -> String { "HBC AIV helperbot14".to_string() }
fn default_legend_page() -> String { "User:HBC AIV helperbot/Legend".to_string() }
fn default_poll_interval() -> u64 { 300 }

impl Config {
    /// Read a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            BotError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| BotError::Configuration(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Credentials, when both halves are present.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.wiki.username, &self.wiki.password) {
            (Some(user), Some(pass)) if !user.is_empty() => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}
