// ── Core error types ──
//
// User-facing errors from printwatch-core. These are NOT API-specific --
// consumers never see websocket frame or HTTP details directly. The
// `From<printwatch_api::Error>` impl translates transport-layer errors
// into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to hub at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Hub disconnected")]
    HubDisconnected,

    #[error("Hub request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("No telemetry for printer prefix '{prefix}'")]
    PrinterNotFound { prefix: String },

    #[error("Recipient not found for prefix '{prefix}'")]
    RecipientNotFound { prefix: String },

    // ── Persistence errors ───────────────────────────────────────────
    #[error("Storage error at {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<printwatch_api::Error> for CoreError {
    fn from(err: printwatch_api::Error) -> Self {
        match err {
            printwatch_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            printwatch_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason,
            },
            printwatch_api::Error::Handshake(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("handshake failed: {reason}"),
            },
            printwatch_api::Error::HubRequest { message } => CoreError::Internal(message),
            printwatch_api::Error::ConnectionClosed => CoreError::HubDisconnected,
            printwatch_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            printwatch_api::Error::Transport(e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else {
                    CoreError::ConnectionFailed {
                        url: e.url().map(ToString::to_string).unwrap_or_default(),
                        reason: e.to_string(),
                    }
                }
            }
            printwatch_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            printwatch_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            printwatch_api::Error::ProviderToken(msg) => CoreError::Config {
                message: format!("Push signing key: {msg}"),
            },
            printwatch_api::Error::BadDeviceToken { reason }
            | printwatch_api::Error::PushDelivery { reason, .. } => {
                CoreError::Internal(format!("push delivery: {reason}"))
            }
            printwatch_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("deserialization error: {message}"))
            }
        }
    }
}
