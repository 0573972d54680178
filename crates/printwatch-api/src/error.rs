use thiserror::Error;

/// Top-level error type for the `printwatch-api` crate.
///
/// Covers every failure mode across both API surfaces: the hub websocket
/// (auth handshake, framing, reconnection) and the push transport.
/// `printwatch-core` maps these into domain-appropriate variants.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The hub rejected the access token. Terminal -- never retried.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Hub websocket ───────────────────────────────────────────────
    /// Websocket connection failed (refused, DNS, TLS handshake, drop).
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The handshake sequence got an unexpected reply.
    #[error("Hub handshake failed: {0}")]
    Handshake(String),

    /// A request/response call failed on the hub side.
    #[error("Hub request failed: {message}")]
    HubRequest { message: String },

    /// The connection task is gone (shut down or exhausted).
    #[error("Hub connection closed")]
    ConnectionClosed,

    /// A handshake or request/response step timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error from the push client.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS configuration or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Push delivery ───────────────────────────────────────────────
    /// The push service rejected the device token (expired or unregistered).
    /// The recipient should be dropped, not retried.
    #[error("Device token rejected: {reason}")]
    BadDeviceToken { reason: String },

    /// Any other non-success response from the push service.
    #[error("Push delivery failed (HTTP {status}): {reason}")]
    PushDelivery { status: u16, reason: String },

    /// Provider token could not be minted (bad signing key, IO).
    #[error("Provider token error: {0}")]
    ProviderToken(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error is an authentication rejection that
    /// requires new credentials (never retried automatically).
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::WebSocketConnect(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if delivery failed because the device token itself
    /// is no longer valid.
    pub fn is_bad_token(&self) -> bool {
        matches!(self, Self::BadDeviceToken { .. })
    }
}
