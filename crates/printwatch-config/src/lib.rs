//! Shared configuration for the printwatch daemon and CLI.
//!
//! TOML profiles, credential resolution (keyring + env + plaintext),
//! and translation to `printwatch_core::MonitorConfig` /
//! `printwatch_api::push::PushConfig`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use printwatch_api::hub::ReconnectConfig;
use printwatch_api::push::{PRODUCTION_ENDPOINT, PushConfig, SANDBOX_ENDPOINT};
use printwatch_api::transport::TransportConfig;
use printwatch_core::MonitorConfig;
use printwatch_core::config::{DEFAULT_LIVE_ACTIVITY_INTERVAL, DEFAULT_MILESTONES};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no access token configured for hub '{hub}'")]
    NoCredentials { hub: String },

    #[error("push delivery is not configured (missing [push] section)")]
    NoPushConfig,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Monitored hubs, keyed by profile name.
    #[serde(default)]
    pub hubs: HashMap<String, HubProfile>,

    /// Push transport credentials. Absent means dispatch cannot run
    /// (the status/history commands still work).
    pub push: Option<PushProfile>,

    /// Overrides for the durable-artifact paths.
    #[serde(default)]
    pub storage: StorageOverrides,
}

/// One monitored hub.
#[derive(Debug, Deserialize, Serialize)]
pub struct HubProfile {
    /// Hub websocket endpoint (e.g., "ws://hub.local:8123/api/websocket").
    pub url: String,

    /// Access token (plaintext -- prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the access token.
    pub token_env: Option<String>,

    /// Progress milestones in percent. Default: 25/50/75.
    pub milestones: Option<Vec<u8>>,

    /// Minimum seconds between live-activity updates. Default: 30.
    pub live_activity_interval_secs: Option<u64>,

    /// Reconnect attempts before giving up. Default: 10.
    pub max_reconnect_attempts: Option<u32>,

    /// Friendly printer names keyed by prefix.
    #[serde(default)]
    pub printers: HashMap<String, String>,
}

/// Push transport credentials.
#[derive(Debug, Deserialize, Serialize)]
pub struct PushProfile {
    /// App bundle topic, e.g. "com.example.printwatch".
    pub topic: String,

    /// Path to the PKCS#8 EC signing key.
    pub key_path: PathBuf,

    pub key_id: String,
    pub team_id: String,

    /// Use the sandbox endpoint (development builds).
    #[serde(default)]
    pub sandbox: bool,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StorageOverrides {
    /// Recipient table path. Default: `<data dir>/recipients.json`.
    pub recipients_path: Option<PathBuf>,

    /// Print history path. Default: `<data dir>/history.jsonl`.
    pub history_path: Option<PathBuf>,
}

// ── Paths ───────────────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "printwatch", "printwatch").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Platform data directory for the durable artifacts.
pub fn data_dir() -> PathBuf {
    ProjectDirs::from("com", "printwatch", "printwatch")
        .map_or_else(dirs_fallback, |dirs| dirs.data_dir().to_path_buf())
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("printwatch");
    p
}

/// Recipient table path, honoring the storage override.
pub fn recipients_path(cfg: &Config) -> PathBuf {
    cfg.storage
        .recipients_path
        .clone()
        .unwrap_or_else(|| data_dir().join("recipients.json"))
}

/// Print history path, honoring the storage override.
pub fn history_path(cfg: &Config) -> PathBuf {
    cfg.storage
        .history_path
        .clone()
        .unwrap_or_else(|| data_dir().join("history.jsonl"))
}

// ── Config loading / saving ─────────────────────────────────────────

/// Load the full Config from file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit path (tests, `--config` flag).
pub fn load_config_from(path: &std::path::Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PRINTWATCH_").split("_"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a hub access token from the credential chain.
pub fn resolve_hub_token(profile: &HubProfile, hub_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new("printwatch", &format!("{hub_name}/token")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        hub: hub_name.into(),
    })
}

/// Store a hub access token in the system keyring.
pub fn store_hub_token(hub_name: &str, token: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new("printwatch", &format!("{hub_name}/token")).map_err(|e| {
        ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        }
    })?;
    entry.set_password(token).map_err(|e| ConfigError::Validation {
        field: "keyring".into(),
        reason: e.to_string(),
    })
}

// ── Translation to runtime configs ──────────────────────────────────

/// Build a `MonitorConfig` from a hub profile.
pub fn hub_to_monitor_config(
    profile: &HubProfile,
    hub_name: &str,
) -> Result<MonitorConfig, ConfigError> {
    let endpoint: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;

    let access_token = resolve_hub_token(profile, hub_name)?;

    let mut reconnect = ReconnectConfig::default();
    if let Some(max) = profile.max_reconnect_attempts {
        reconnect.max_attempts = Some(max);
    }

    Ok(MonitorConfig {
        name: hub_name.to_owned(),
        endpoint,
        access_token,
        reconnect,
        milestones: profile
            .milestones
            .clone()
            .unwrap_or_else(|| DEFAULT_MILESTONES.to_vec()),
        live_activity_interval: profile
            .live_activity_interval_secs
            .map_or(DEFAULT_LIVE_ACTIVITY_INTERVAL, Duration::from_secs),
        printer_names: profile.printers.clone(),
    })
}

/// Build a `PushConfig` from the `[push]` section.
pub fn push_to_config(cfg: &Config) -> Result<PushConfig, ConfigError> {
    let profile = cfg.push.as_ref().ok_or(ConfigError::NoPushConfig)?;

    let endpoint = if profile.sandbox {
        SANDBOX_ENDPOINT
    } else {
        PRODUCTION_ENDPOINT
    };
    let endpoint: url::Url = endpoint.parse().map_err(|_| ConfigError::Validation {
        field: "push.endpoint".into(),
        reason: "invalid push endpoint".into(),
    })?;

    Ok(PushConfig {
        endpoint,
        topic: profile.topic.clone(),
        key_path: profile.key_path.clone(),
        key_id: profile.key_id.clone(),
        team_id: profile.team_id.clone(),
        transport: TransportConfig::default(),
    })
}

// ── Tests ────────────────────────────────────────────────────────────
