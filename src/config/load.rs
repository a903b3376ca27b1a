//! Configuration loading with env-var overrides.
//!
//! Reads TOML files, supports `[meta] base = "..."` inheritance chains, and
//! applies environment overrides captured in [`EnvOverrides`].

use std::collections::{HashMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;

use super::raw::RawConfig;
use super::types::*;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variables that take part in prompt resolution carry this
/// prefix and are stored under their full name.
pub const PROMPT_ENV_PREFIX: &str = "PROMPT_";

/// Environment-sourced values, captured once so the loader never reads the
/// process environment itself. Tests build this directly.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    /// `OPENAI_API_KEY`
    pub api_key: Option<String>,
    /// `OPENAI_MODEL`
    pub model: Option<String>,
    /// `API_GW_ENDPOINT`
    pub push_endpoint: Option<String>,
    /// `RELAY_BIND`
    pub bind: Option<String>,
    /// `RELAY_LOG_LEVEL`
    pub log_level: Option<String>,
    /// Every `PROMPT_*` variable.
    pub prompts: HashMap<String, String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("OPENAI_API_KEY").ok(),
            model: env::var("OPENAI_MODEL").ok(),
            push_endpoint: env::var("API_GW_ENDPOINT").ok(),
            bind: env::var("RELAY_BIND").ok(),
            log_level: env::var("RELAY_LOG_LEVEL").ok(),
            prompts: env::vars()
                .filter(|(k, _)| k.starts_with(PROMPT_ENV_PREFIX))
                .collect(),
        }
    }
}

/// Deep-merge two TOML values. Tables merge recursively; any other overlay
/// value replaces the base value wholesale.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, ov_val) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(base_val) => merge_toml(base_val, ov_val),
                    None => ov_val,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file, follow any `[meta] base = "..."` chain, and return the
/// merged value. `visited` holds canonical paths already seen in this chain.
fn load_raw_merged(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Err(AppError::Config(format!(
            "circular base reference detected at: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let overlay_val: toml::Value = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if let Some(base_str) = overlay_val
        .get("meta")
        .and_then(|m| m.get("base"))
        .and_then(|b| b.as_str())
    {
        let base_path = if Path::new(base_str).is_absolute() {
            PathBuf::from(base_str)
        } else {
            path.parent().unwrap_or(Path::new(".")).join(base_str)
        };
        let base_val = load_raw_merged(&base_path, visited)?;
        Ok(merge_toml(base_val, overlay_val))
    } else {
        Ok(overlay_val)
    }
}

/// Load config from the given path, or `config/default.toml` when present,
/// then apply overrides from the process environment.
///
/// With no path and no default file, built-in defaults are used and the
/// environment must supply the credential and the push endpoint.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let env = EnvOverrides::from_env();

    if let Some(path) = config_path {
        return load_from(Path::new(path), &env);
    }

    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    if default_path.exists() {
        load_from(default_path, &env)
    } else {
        resolve(RawConfig::default(), &env)
    }
}

/// Load from an explicit path with explicit overrides.
pub fn load_from(path: &Path, env: &EnvOverrides) -> Result<Config, AppError> {
    let merged_val = load_raw_merged(path, &mut HashSet::new())?;

    let parsed: RawConfig = Deserialize::deserialize(merged_val).map_err(|e: toml::de::Error| {
        AppError::Config(format!("config error in {}: {e}", path.display()))
    })?;

    resolve(parsed, env)
}

/// Apply overrides and check the fatal-at-startup requirements.
fn resolve(raw: RawConfig, env: &EnvOverrides) -> Result<Config, AppError> {
    let api_key = env
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            AppError::Config(
                "upstream API key not found in environment variable OPENAI_API_KEY".into(),
            )
        })?;

    let push_endpoint = env
        .push_endpoint
        .clone()
        .unwrap_or(raw.push.endpoint)
        .trim()
        .trim_end_matches('/')
        .to_string();
    if push_endpoint.is_empty() {
        return Err(AppError::Config(
            "push endpoint not found: set API_GW_ENDPOINT or [push] endpoint".into(),
        ));
    }

    let mut prompts = raw.prompts;
    prompts.extend(env.prompts.iter().map(|(k, v)| (k.clone(), v.clone())));

    Ok(Config {
        server: ServerConfig {
            bind: env.bind.clone().unwrap_or(raw.server.bind),
            log_level: env.log_level.clone().unwrap_or(raw.server.log_level),
        },
        upstream: UpstreamConfig {
            provider: raw.upstream.provider,
            api_base_url: raw.upstream.api_base_url.trim_end_matches('/').to_string(),
            model: env.model.clone().unwrap_or(raw.upstream.model).trim().to_string(),
            default_model: raw.upstream.default_model,
            timeout_seconds: raw.upstream.timeout_seconds,
        },
        push: PushConfig {
            endpoint: push_endpoint,
            timeout_seconds: raw.push.timeout_seconds,
        },
        prompts,
        api_key,
    })
}
