//! Raw TOML deserialization types.
//!
//! These structs mirror the file shape and use `serde` defaults. The `load`
//! module converts them into the public `types` structs.

use std::collections::HashMap;

use serde::Deserialize;

/// Raw TOML shape: serde target before resolution. Every section is
/// optional so an env-only deployment needs no file at all.
#[derive(Deserialize, Default)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub server: RawServer,
    #[serde(default)]
    pub upstream: RawUpstream,
    #[serde(default)]
    pub push: RawPush,
    #[serde(default)]
    pub prompts: HashMap<String, String>,
}

#[derive(Deserialize)]
pub(super) struct RawServer {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RawServer {
    fn default() -> Self {
        Self { bind: default_bind(), log_level: default_log_level() }
    }
}

#[derive(Deserialize)]
pub(super) struct RawUpstream {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_upstream_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for RawUpstream {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_base_url: default_api_base_url(),
            model: String::new(),
            default_model: default_model(),
            timeout_seconds: default_upstream_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct RawPush {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_push_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for RawPush {
    fn default() -> Self {
        Self { endpoint: String::new(), timeout_seconds: default_push_timeout_seconds() }
    }
}

pub(super) fn default_bind() -> String { "127.0.0.1:8080".to_string() }
pub(super) fn default_log_level() -> String { "info".to_string() }
pub(super) fn default_provider() -> String { "openai".to_string() }
pub(super) fn default_api_base_url() -> String { "https://api.openai.com/v1".to_string() }
pub(super) fn default_model() -> String { "gpt-3.5-turbo".to_string() }
pub(super) fn default_upstream_timeout_seconds() -> u64 { 60 }
pub(super) fn default_push_timeout_seconds() -> u64 { 10 }
