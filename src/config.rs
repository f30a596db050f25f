//! Configuration file support for talkroom
//!
//! Reads `talkroom.toml` from the platform config directory, or the file
//! named by `TALKROOM_CONFIG`. Every key is optional.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::AppError;

pub const APP_DIR: &str = "talkroom";
const CONFIG_FILE: &str = "talkroom.toml";

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// User id to act as when `--user` / `TALKROOM_USER` are not given
    #[serde(default)]
    pub default_user: Option<i64>,

    /// Offset from UTC used to decide which calendar day "today" is
    #[serde(default)]
    pub utc_offset_minutes: i32,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub push: PushConfig,

    #[serde(default)]
    pub payments: PaymentsConfig,
}

/// Client-side chat rules
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before attempt n+1 is `n * retry_step_ms`
    #[serde(default = "default_retry_step_ms")]
    pub retry_step_ms: u64,

    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_min_interval_ms() -> u64 {
    3000
}

fn default_max_message_len() -> usize {
    500
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_step_ms() -> u64 {
    500
}

fn default_page_size() -> usize {
    30
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            max_message_len: default_max_message_len(),
            max_attempts: default_max_attempts(),
            retry_step_ms: default_retry_step_ms(),
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Push delivery. Notifications are only stored when no key is set.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PushConfig {
    #[serde(default)]
    pub fcm_server_key: Option<String>,

    #[serde(default = "default_push_endpoint")]
    pub endpoint: String,
}

fn default_push_endpoint() -> String {
    "https://fcm.googleapis.com/fcm/send".to_string()
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            fcm_server_key: None,
            endpoint: default_push_endpoint(),
        }
    }
}

/// Payment gateway. Refunds are ledger-only when no key is set.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PaymentsConfig {
    #[serde(default)]
    pub secret_key: Option<String>,

    #[serde(default = "default_payments_endpoint")]
    pub endpoint: String,
}

fn default_payments_endpoint() -> String {
    "https://api.tosspayments.com/v1/payments".to_string()
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            endpoint: default_payments_endpoint(),
        }
    }
}

impl Config {
    /// Load config, falling back to defaults when no file exists.
    /// A file that exists but does not parse is an error.
    pub fn load() -> Result<Self, AppError> {
        match Self::config_path() {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)?;
                Self::parse(&contents)
                    .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("TALKROOM_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chat.min_interval_ms, 3000);
        assert_eq!(config.chat.max_message_len, 500);
        assert_eq!(config.chat.max_attempts, 3);
        assert_eq!(config.chat.retry_step_ms, 500);
        assert_eq!(config.chat.page_size, 30);
        assert_eq!(config.server.port, 8787);
        assert!(config.push.fcm_server_key.is_none());
        assert!(config.payments.secret_key.is_none());
        assert_eq!(config.utc_offset_minutes, 0);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
default_user = 4
utc_offset_minutes = 540

[chat]
min_interval_ms = 1000

[push]
fcm_server_key = "abc"
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.default_user, Some(4));
        assert_eq!(config.utc_offset_minutes, 540);
        assert_eq!(config.chat.min_interval_ms, 1000);
        assert_eq!(config.chat.max_attempts, 3);
        assert_eq!(config.push.fcm_server_key.as_deref(), Some("abc"));
        assert_eq!(config.push.endpoint, "https://fcm.googleapis.com/fcm/send");
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert!(config.default_user.is_none());
        assert_eq!(config.server.bind, "127.0.0.1");
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        assert!(Config::parse("utc_offset_minutes = \"nine\"").is_err());
    }
}
