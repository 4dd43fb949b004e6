//! Configuration loading for ohero-chat.
//!
//! Configuration is resolved from three fallback sources (tried in order):
//!
//! 1. **JSON file** via `--config <path>` CLI flag
//! 2. **JSON file** via `OHERO_CONFIG` environment variable
//! 3. **Environment variables**: `OHERO_WS_URL` + `OHERO_API_KEY` over the
//!    compiled defaults
//!
//! The file is the same `config.json` the web frontend ships, so both the
//! camelCase keys (`webSocketUrl`, `apiKey`) and snake_case keys are accepted:
//!
//! ```json
//! {
//!   "webSocketUrl": "wss://abc123.execute-api.us-east-1.amazonaws.com/prod",
//!   "apiKey": "your-secure-api-key",
//!   "user_id": "web-user",
//!   "reconnect": { "max_attempts": 5, "base_delay_ms": 1000 },
//!   "heartbeat_interval_ms": 480000,
//!   "logging": { "level": "info" }
//! }
//! ```
//!
//! An empty endpoint or credential is not a load error. `connect()` reports it
//! as a configuration error instead, so the session can still start offline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

/// Environment variable holding a config file path.
pub const CONFIG_ENV: &str = "OHERO_CONFIG";
/// Environment variable overriding the gateway endpoint.
pub const URL_ENV: &str = "OHERO_WS_URL";
/// Environment variable overriding the gateway credential.
pub const API_KEY_ENV: &str = "OHERO_API_KEY";

/// CLI arguments parsed by `clap`.
#[derive(Parser, Debug, Default)]
#[command(name = "ohero-chat", version, about = "Terminal client for the OHERO chat gateway")]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Channel to open on start (defaults to the default channel)
    #[arg(long)]
    pub channel: Option<String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Gateway WebSocket endpoint, e.g. `wss://…/prod`.
    #[serde(default, alias = "webSocketUrl")]
    pub websocket_url: String,
    /// Application credential, sent as the `apiKey` query parameter.
    #[serde(default, alias = "apiKey")]
    pub api_key: String,
    /// Identifier sent as the `userId` connection parameter.
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// `userId` field of outbound chat frames.
    #[serde(default = "default_sender_id")]
    pub sender_id: String,
    /// Author recorded on locally sent messages. Never counted as unread.
    #[serde(default = "default_local_author")]
    pub local_author: String,
    /// Author recorded on inbound messages.
    #[serde(default = "default_assistant_author")]
    pub assistant_author: String,
    #[serde(default = "default_channel_id")]
    pub default_channel_id: String,
    #[serde(default = "default_channel_name")]
    pub default_channel_name: String,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Keep-alive ping interval (default 8 minutes).
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Delay between `open` and the automatic directory request (default 1 s).
    #[serde(default = "default_directory_refresh_delay_ms")]
    pub directory_refresh_delay_ms: u64,
    /// How long a connection attempt may take before it counts as failed.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Number of system notices kept in memory (default 200).
    #[serde(default = "default_notice_log_size")]
    pub notice_log_size: usize,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Reconnection policy parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReconnectConfig {
    /// Attempts before giving up (default 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay of the first attempt; doubles on each further attempt (default 1000 ms).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_user_id() -> String {
    "web-user".to_string()
}
fn default_sender_id() -> String {
    "webchat".to_string()
}
fn default_local_author() -> String {
    "You".to_string()
}
fn default_assistant_author() -> String {
    "OHERO Assistant".to_string()
}
fn default_channel_id() -> String {
    "default-channel-001".to_string()
}
fn default_channel_name() -> String {
    "Default Team".to_string()
}
fn default_heartbeat_interval_ms() -> u64 {
    8 * 60 * 1000
}
fn default_directory_refresh_delay_ms() -> u64 {
    1000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_notice_log_size() -> usize {
    200
}
fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            websocket_url: String::new(),
            api_key: String::new(),
            user_id: default_user_id(),
            sender_id: default_sender_id(),
            local_author: default_local_author(),
            assistant_author: default_assistant_author(),
            default_channel_id: default_channel_id(),
            default_channel_name: default_channel_name(),
            reconnect: ReconnectConfig::default(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            directory_refresh_delay_ms: default_directory_refresh_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            notice_log_size: default_notice_log_size(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ChatConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn directory_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.directory_refresh_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Apply `OHERO_WS_URL` / `OHERO_API_KEY` when set and non-empty.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(URL_ENV) {
            if !url.is_empty() {
                self.websocket_url = url;
            }
        }
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.api_key = key;
            }
        }
    }
}

/// Load configuration from CLI args, env vars, or config file.
pub fn load_config(cli: &Cli) -> Result<ChatConfig, String> {
    if let Some(path) = &cli.config {
        load_from_file(&expand_tilde(path))
    } else if let Ok(path) = std::env::var(CONFIG_ENV) {
        load_from_file(&expand_tilde(Path::new(&path)))
    } else {
        let mut config = ChatConfig::default();
        config.apply_env_overrides();
        Ok(config)
    }
}

/// Expand a leading `~` to `$HOME`.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

fn load_from_file(path: &Path) -> Result<ChatConfig, String> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;
    let mut config = parse_config(&contents)
        .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;
    config.apply_env_overrides();
    Ok(config)
}

/// Parse and validate a JSON config document.
pub fn parse_config(contents: &str) -> Result<ChatConfig, String> {
    let config: ChatConfig = serde_json::from_str(contents).map_err(|e| e.to_string())?;

    if config.reconnect.base_delay_ms == 0 {
        return Err("reconnect.base_delay_ms must be greater than 0".into());
    }
    if config.heartbeat_interval_ms == 0 {
        return Err("heartbeat_interval_ms must be greater than 0".into());
    }
    if config.default_channel_id.is_empty() {
        return Err("default_channel_id must not be empty".into());
    }
    Ok(config)
}

/// Replace every occurrence of `secret` in `text` with `***`.
///
/// Used before logging anything that embeds the credential.
pub fn mask_credential(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, "***")
}
