//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use printwatch_config::ConfigError;
use printwatch_core::CoreError;

/// Exit codes, one per failure class.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    /// The daemon stopped because a hub became unreachable for good.
    pub const EXHAUSTED: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to hub at {url}: {reason}")]
    #[diagnostic(
        code(printwatch::connection_failed),
        help(
            "Check that the hub is running and the websocket endpoint is reachable.\n\
             URL: {url}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Hub '{hub}' is no longer reachable ({detail})")]
    #[diagnostic(
        code(printwatch::hub_terminated),
        help(
            "The reconnect budget is spent. Restart the daemon once the hub is back,\n\
             or let your process supervisor handle it."
        )
    )]
    HubTerminated { hub: String, detail: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed for hub '{hub}'")]
    #[diagnostic(
        code(printwatch::auth_failed),
        help(
            "The access token was rejected and will not be retried.\n\
             Store a fresh one with: printwatch config set-token {hub}"
        )
    )]
    AuthFailed { hub: String },

    #[error("No access token configured for hub '{hub}'")]
    #[diagnostic(
        code(printwatch::no_credentials),
        help(
            "Store one with: printwatch config set-token {hub}\n\
             Or set token / token_env in the hub profile."
        )
    )]
    NoCredentials { hub: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("No telemetry for printer prefix '{prefix}'")]
    #[diagnostic(
        code(printwatch::printer_not_found),
        help("Run: printwatch status to see known printers")
    )]
    PrinterNotFound { prefix: String },

    #[error("Hub profile '{name}' not found in configuration")]
    #[diagnostic(
        code(printwatch::hub_not_found),
        help("Configured hubs: {available}")
    )]
    HubNotFound { name: String, available: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration file not found or incomplete")]
    #[diagnostic(
        code(printwatch::no_config),
        help("Expected at: {path}\nAdd at least one [hubs.<name>] section.")
    )]
    NoConfig { path: String },

    #[error("Push delivery is not configured")]
    #[diagnostic(
        code(printwatch::no_push_config),
        help("Add a [push] section with topic, key_path, key_id, and team_id.")
    )]
    NoPushConfig,

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(printwatch::validation))]
    Validation { field: String, reason: String },

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(printwatch::timeout),
        help("Check hub responsiveness and network path.")
    )]
    Timeout { seconds: u64 },

    // ── Internal / passthrough ───────────────────────────────────────

    #[error("{message}")]
    #[diagnostic(code(printwatch::internal))]
    Internal { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(printwatch::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::HubTerminated { .. } => exit_code::EXHAUSTED,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::PrinterNotFound { .. } | Self::HubNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NoConfig { .. } | Self::NoPushConfig => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => {
                CliError::ConnectionFailed { url, reason }
            }
            CoreError::AuthenticationFailed { message: _ } => CliError::AuthFailed {
                hub: "current".into(),
            },
            CoreError::HubDisconnected => CliError::ConnectionFailed {
                url: "(disconnected)".into(),
                reason: "hub connection was lost".into(),
            },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::PrinterNotFound { prefix } | CoreError::RecipientNotFound { prefix } => {
                CliError::PrinterNotFound { prefix }
            }
            CoreError::Storage { path, source } => CliError::Internal {
                message: format!("storage error at {path}: {source}"),
            },
            CoreError::Serialization(e) => CliError::Json(e),
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal { message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { hub } => CliError::NoCredentials { hub },
            ConfigError::NoPushConfig => CliError::NoPushConfig,
            ConfigError::Serialization(e) => CliError::Internal {
                message: e.to_string(),
            },
            ConfigError::Figment(e) => CliError::Validation {
                field: "config".into(),
                reason: e.to_string(),
            },
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}
