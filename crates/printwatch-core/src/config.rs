// ── Runtime monitor configuration ──
//
// These types describe *how* to watch one hub. They carry credential
// data and pipeline tuning, but never touch disk. The CLI constructs a
// `MonitorConfig` per configured hub and hands it in.

use std::collections::HashMap;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use printwatch_api::hub::ReconnectConfig;

/// Default progress milestones, in percent.
pub const DEFAULT_MILESTONES: [u8; 3] = [25, 50, 75];

/// Default minimum interval between live-activity content updates.
pub const DEFAULT_LIVE_ACTIVITY_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for monitoring a single hub.
///
/// Built by the CLI from its config file -- core never reads config files.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Display name of this hub (profile key in the config file).
    pub name: String,

    /// Websocket endpoint, e.g. `ws://hub.local:8123/api/websocket`.
    pub endpoint: Url,

    /// Long-lived hub access token.
    pub access_token: SecretString,

    /// Reconnect/backoff policy for the event stream.
    pub reconnect: ReconnectConfig,

    /// Progress thresholds that trigger a milestone notification,
    /// ascending. Each fires at most once per print lifecycle.
    pub milestones: Vec<u8>,

    /// Minimum interval between live-activity content updates while a
    /// print is running or paused.
    pub live_activity_interval: Duration,

    /// Friendly printer names keyed by prefix, used in notification
    /// templates. Unlisted prefixes fall back to the prefix itself.
    pub printer_names: HashMap<String, String>,
}

impl MonitorConfig {
    /// Minimal config for a hub; tuning fields take their defaults.
    pub fn new(name: impl Into<String>, endpoint: Url, access_token: SecretString) -> Self {
        Self {
            name: name.into(),
            endpoint,
            access_token,
            reconnect: ReconnectConfig::default(),
            milestones: DEFAULT_MILESTONES.to_vec(),
            live_activity_interval: DEFAULT_LIVE_ACTIVITY_INTERVAL,
            printer_names: HashMap::new(),
        }
    }

    /// Friendly name for a printer prefix.
    pub fn printer_name<'a>(&'a self, prefix: &'a str) -> &'a str {
        self.printer_names
            .get(prefix)
            .map_or(prefix, String::as_str)
    }
}
