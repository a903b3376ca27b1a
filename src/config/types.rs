//! Public configuration types.
//!
//! Resolved, ready-to-use structs. Raw TOML deserialization types live in
//! `raw.rs`.

use std::collections::HashMap;

/// Listener and process settings (`[server]`).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address the axum channel binds to.
    pub bind: String,
    pub log_level: String,
}

/// Upstream chat-completion service (`[upstream]`).
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// `"openai"` for any OpenAI-compatible endpoint, `"dummy"` for the
    /// in-process echo provider.
    pub provider: String,
    /// API root without trailing slash; `/chat/completions` and `/models`
    /// are appended.
    pub api_base_url: String,
    /// Requested model. Empty means "use `default_model`".
    pub model: String,
    /// Substituted whenever `model` is empty, unlisted, or the model list
    /// cannot be fetched.
    pub default_model: String,
    pub timeout_seconds: u64,
}

/// Connection-push channel (`[push]`).
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Management endpoint; pushes go to `{endpoint}/@connections/{id}`.
    pub endpoint: String,
    pub timeout_seconds: u64,
}

/// Fully-resolved configuration. Built once at startup and passed by
/// reference into whatever needs it; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub push: PushConfig,
    /// Prompt template entries, keyed by the name clients send as
    /// `prompt_template`.
    pub prompts: HashMap<String, String>,
    /// Upstream credential from `OPENAI_API_KEY`. Never sourced from TOML.
    pub api_key: String,
}
